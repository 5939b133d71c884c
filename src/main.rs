use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use voicecare_backend::config::Config;
use voicecare_backend::db::entitlement_repository::EntitlementRepository;
use voicecare_backend::db::postgres_entitlement_repository::PostgresEntitlementRepository;
use voicecare_backend::routes::api_router;
use voicecare_backend::services::stripe::{LiveStripeService, StripeService};
use voicecare_backend::utils::jwt::JwtKeys;
use voicecare_backend::{worker, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Arc::new(Config::from_env().context("invalid configuration")?);
    let jwt_keys = Arc::new(JwtKeys::from_env().context("invalid JWT configuration")?);

    let pg_pool = establish_connection(&config.database_url).await?;
    let db = Arc::new(PostgresEntitlementRepository { pool: pg_pool }) as Arc<dyn EntitlementRepository>;
    let stripe = Arc::new(LiveStripeService::from_settings(&config.stripe)) as Arc<dyn StripeService>;

    let state = AppState::new(db, stripe, config.clone(), jwt_keys);
    let state_for_worker = state.clone();

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let app = api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    worker::start_background_workers(state_for_worker).await;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// `RUST_LOG` drives the filter; `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("successfully connected to the database");
    Ok(pool)
}
