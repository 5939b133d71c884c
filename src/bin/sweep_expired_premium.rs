use std::env;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;

use voicecare_backend::db::postgres_entitlement_repository::PostgresEntitlementRepository;
use voicecare_backend::services::billing::sweep::sweep_expired_premium;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let database_url =
        env::var("DATABASE_URL").context("DATABASE_URL is required to sweep expired premium")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to DATABASE_URL")?;

    let repo = PostgresEntitlementRepository { pool };
    let now = Utc::now();
    let cleared = sweep_expired_premium(&repo, now)
        .await
        .context("failed to clear expired premium entitlements")?;

    println!("Cleared premium on {cleared} account(s) expired at or before {now}.");
    Ok(())
}
