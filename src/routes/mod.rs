pub mod auth;
pub mod billing;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// All routes under `/api/v1`. Layers (tracing, CORS) are added by the caller.
pub fn api_router(state: AppState) -> Router {
    let billing_routes = Router::new()
        .route("/webhook", post(billing::stripe_webhook))
        .route("/checkout", post(billing::create_checkout))
        .route("/session/{session_id}", get(billing::session_status))
        .route("/cancel", post(billing::cancel_subscription))
        .route("/entitlement", get(billing::entitlement_status));

    Router::new()
        .route("/api/v1/health", get(health::health))
        .nest("/api/v1/billing", billing_routes)
        .with_state(state)
}
