use axum::response::Response;

use crate::responses::JsonResponse;

// GET /api/v1/health
pub async fn health() -> Response {
    JsonResponse::success("ok")
}
