use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::db::entitlement_repository::EntitlementRepository;

/// Clears the cached premium flag and subscription id on every row whose
/// expiry has passed. The gate already treats those rows as free; this
/// only brings the stored flag back in line.
pub async fn sweep_expired_premium(
    repo: &dyn EntitlementRepository,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    match repo.clear_expired_premium(now).await {
        Ok(cleared) => {
            if cleared > 0 {
                info!(cleared, %now, "cleared expired premium entitlements");
            }
            Ok(cleared)
        }
        Err(err) => {
            error!(?err, "expired premium sweep failed");
            Err(err)
        }
    }
}
