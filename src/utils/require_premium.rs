use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::error;

use crate::responses::JsonResponse;
use crate::routes::auth::AuthSession;
use crate::services::billing::is_entitled;
use crate::state::AppState;

/// Gate for premium-only routes. Mount with
/// `axum::middleware::from_fn_with_state(state, require_premium)`.
pub async fn require_premium(
    State(state): State<AppState>,
    session: AuthSession,
    req: Request,
    next: Next,
) -> Response {
    match state.db.find_by_id(session.user_id).await {
        Ok(Some(user)) if is_entitled(&user) => next.run(req).await,
        Ok(_) => JsonResponse::forbidden_with_code(
            "This feature requires an active premium subscription",
            "PREMIUM_REQUIRED",
        ),
        Err(err) => {
            error!(?err, user_id = %session.user_id, "failed to load entitlement for gate");
            JsonResponse::server_error("Internal server error")
        }
    }
}
