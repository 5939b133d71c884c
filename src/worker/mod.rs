use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::info;

use crate::services::billing::sweep::sweep_expired_premium;
use crate::state::AppState;

pub async fn start_background_workers(state: AppState) {
    let Some(interval) = state.config.premium_sweep_interval else {
        info!("expired premium sweep disabled");
        return;
    };

    tokio::spawn(async move {
        loop {
            // Failures are logged by the sweep; try again next tick.
            let _ = sweep_expired_premium(state.db.as_ref(), Utc::now()).await;
            sleep(interval).await;
        }
    });
}
