use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::routes::auth::claims::Claims;
use crate::state::AppState;
use crate::utils::jwt::decode_jwt;

/// The authenticated caller, from a Bearer token or the `auth_token` cookie.
#[derive(Debug, PartialEq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub claims: Claims,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts) {
            Some(token) => token,
            None => {
                let jar = CookieJar::from_headers(&parts.headers);
                jar.get("auth_token")
                    .map(|c| c.value().to_string())
                    .ok_or(StatusCode::UNAUTHORIZED)?
            }
        };

        let claims = decode_jwt(&token, &state.jwt_keys)
            .map_err(|_| StatusCode::UNAUTHORIZED)?
            .claims;
        let user_id = Uuid::parse_str(&claims.id).map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(AuthSession { user_id, claims })
    }
}
