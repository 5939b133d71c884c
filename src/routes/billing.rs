use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::responses::JsonResponse;
use crate::routes::auth::AuthSession;
use crate::services::billing::{
    is_entitled_at, premium_state_at, BillingError, ErrorClass, WebhookOutcome,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub plan: String,
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        // Dependency details stay in the logs.
        let (status, message) = match (&self, self.class()) {
            (BillingError::Provider(_), _) => (
                StatusCode::BAD_GATEWAY,
                "Billing provider unavailable, please retry".to_string(),
            ),
            (_, ErrorClass::Dependency) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            (_, ErrorClass::Validation | ErrorClass::Authentication) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            (_, ErrorClass::NotFound) => (StatusCode::NOT_FOUND, self.to_string()),
            (_, ErrorClass::Conflict) => (StatusCode::CONFLICT, self.to_string()),
        };
        JsonResponse::error_with_code(status, &message, self.code())
    }
}

// POST /api/v1/billing/checkout
pub async fn create_checkout(
    State(app_state): State<AppState>,
    session: AuthSession,
    Json(body): Json<CheckoutBody>,
) -> Response {
    match app_state
        .checkout
        .create_checkout(session.user_id, &body.plan)
        .await
    {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => err.into_response(),
    }
}

// GET /api/v1/billing/session/{session_id}
pub async fn session_status(
    State(app_state): State<AppState>,
    session: AuthSession,
    Path(session_id): Path<String>,
) -> Response {
    match app_state
        .checkout
        .get_session_status(session.user_id, &session_id)
        .await
    {
        Ok(status) => Json(status).into_response(),
        Err(err) => err.into_response(),
    }
}

// POST /api/v1/billing/cancel
pub async fn cancel_subscription(
    State(app_state): State<AppState>,
    session: AuthSession,
) -> Response {
    match app_state
        .checkout
        .cancel_subscription(session.user_id)
        .await
    {
        Ok(()) => JsonResponse::success("Subscription cancelled"),
        Err(err) => err.into_response(),
    }
}

// GET /api/v1/billing/entitlement
pub async fn entitlement_status(
    State(app_state): State<AppState>,
    session: AuthSession,
) -> Response {
    let user = match app_state.db.find_by_id(session.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return BillingError::UserNotFound.into_response(),
        Err(err) => {
            error!(?err, user_id = %session.user_id, "failed to load entitlement");
            return BillingError::Persistence(err).into_response();
        }
    };

    let now = Utc::now();
    Json(json!({
        "is_premium": is_entitled_at(&user, now),
        "premium_expires_at": user.premium_expires_at,
        "premium": premium_state_at(&user, now),
    }))
    .into_response()
}

// POST /api/v1/billing/webhook
pub async fn stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature"),
    };

    match app_state.webhooks.process(&body, sig).await {
        Ok(WebhookOutcome::Reconciled(_)) | Ok(WebhookOutcome::Ignored { .. }) => {
            Json(json!({ "received": true })).into_response()
        }
        Err(err) => {
            if matches!(err.class(), ErrorClass::Dependency) {
                error!(?err, "stripe webhook processing failed, provider will retry");
            } else {
                warn!(?err, "stripe webhook rejected");
            }
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::db::mock_db::MockDb;
    use crate::models::entitlement::UserEntitlement;
    use crate::routes::api_router;
    use crate::services::billing::normalizer::sign_payload;
    use crate::services::stripe::{CheckoutSessionDetails, MockStripeService};
    use crate::state::test_support::{test_state, WEBHOOK_SECRET};
    use crate::state::AppState;
    use crate::utils::jwt::{claims_for, create_jwt};

    struct Harness {
        app: Router,
        state: AppState,
        db: Arc<MockDb>,
        stripe: MockStripeService,
    }

    fn harness(users: Vec<UserEntitlement>) -> Harness {
        harness_with(users, MockStripeService::new())
    }

    fn harness_with(users: Vec<UserEntitlement>, stripe: MockStripeService) -> Harness {
        let db = Arc::new(MockDb::with_users(users));
        let state = test_state(db.clone(), stripe.clone());
        Harness {
            app: api_router(state.clone()),
            state,
            db,
            stripe,
        }
    }

    fn bearer(state: &AppState, user_id: Uuid) -> String {
        let jwt = create_jwt(&claims_for(user_id, 3600), &state.jwt_keys).unwrap();
        format!("Bearer {jwt}")
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn webhook_request(payload: &Value, signature: Option<String>) -> Request<Body> {
        let bytes = serde_json::to_vec(payload).unwrap();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/billing/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(sig) = signature {
            builder = builder.header("Stripe-Signature", sig);
        }
        builder.body(Body::from(bytes)).unwrap()
    }

    fn signed_webhook(payload: &Value) -> Request<Body> {
        let bytes = serde_json::to_vec(payload).unwrap();
        let sig = sign_payload(WEBHOOK_SECRET, &bytes, Utc::now().timestamp());
        webhook_request(payload, Some(sig))
    }

    #[tokio::test]
    async fn checkout_returns_session_for_free_user() {
        let user = UserEntitlement::new_free(Uuid::new_v4(), "p@example.com");
        let h = harness(vec![user.clone()]);

        let resp = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/billing/checkout")
                    .header(header::AUTHORIZATION, bearer(&h.state, user.id))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"plan":"quarterly"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(json["session_id"].as_str().unwrap().starts_with("cs_test_"));
        assert_eq!(json["url"], "https://example.test/checkout");
        assert_eq!(
            h.stripe.last_create_requests.lock().unwrap()[0].price_id,
            "price_quarter"
        );
    }

    #[tokio::test]
    async fn checkout_maps_domain_errors() {
        let mut premium = UserEntitlement::new_free(Uuid::new_v4(), "p@example.com");
        premium.is_premium = true;
        let h = harness(vec![premium.clone()]);

        let send = |plan: &str, user_id: Uuid| {
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/billing/checkout")
                .header(header::AUTHORIZATION, bearer(&h.state, user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "plan": plan }).to_string()))
                .unwrap()
        };

        let resp = h.app.clone().oneshot(send("monthly", premium.id)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["code"], "ALREADY_PREMIUM");

        let resp = h.app.clone().oneshot(send("daily", premium.id)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "INVALID_PLAN");

        let resp = h.app.clone().oneshot(send("monthly", Uuid::new_v4())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn checkout_requires_authentication() {
        let h = harness(vec![]);
        let resp = h
            .app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/billing/checkout")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"plan":"monthly"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn provider_outage_is_bad_gateway() {
        let user = UserEntitlement::new_free(Uuid::new_v4(), "p@example.com");
        let h = harness_with(vec![user.clone()], MockStripeService::new().failing("down"));
        let resp = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/billing/checkout")
                    .header(header::AUTHORIZATION, bearer(&h.state, user.id))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"plan":"monthly"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "PROVIDER_UNAVAILABLE");
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn session_status_route() {
        let user = UserEntitlement::new_free(Uuid::new_v4(), "p@example.com");
        let stripe = MockStripeService::new().with_session(CheckoutSessionDetails {
            id: "cs_test_route".into(),
            payment_status: "paid".into(),
            subscription_id: Some("sub_route".into()),
            client_reference_id: Some(user.id.to_string()),
            metadata: Default::default(),
        });
        let h = harness_with(vec![user.clone()], stripe);

        let get = |path: &str| {
            Request::builder()
                .uri(path)
                .header(header::AUTHORIZATION, bearer(&h.state, user.id))
                .body(Body::empty())
                .unwrap()
        };

        let resp = h
            .app
            .clone()
            .oneshot(get("/api/v1/billing/session/cs_test_route"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({ "payment_status": "paid", "subscription_id": "sub_route" })
        );

        let resp = h
            .app
            .clone()
            .oneshot(get("/api/v1/billing/session/pi_123"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "INVALID_SESSION_ID");

        let resp = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/billing/session/cs_test_route")
                    .header(header::AUTHORIZATION, bearer(&h.state, Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn cancel_route_conflict_then_success() {
        let free = UserEntitlement::new_free(Uuid::new_v4(), "free@example.com");
        let mut subscribed = UserEntitlement::new_free(Uuid::new_v4(), "sub@example.com");
        subscribed.is_premium = true;
        subscribed.stripe_subscription_id = Some("sub_live".into());
        let h = harness(vec![free.clone(), subscribed.clone()]);

        let post = |user_id: Uuid| {
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/billing/cancel")
                .header(header::AUTHORIZATION, bearer(&h.state, user_id))
                .body(Body::empty())
                .unwrap()
        };

        let resp = h.app.clone().oneshot(post(free.id)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["code"], "NO_ACTIVE_SUBSCRIPTION");

        let resp = h.app.clone().oneshot(post(subscribed.id)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!h.db.get(subscribed.id).unwrap().is_premium);
    }

    #[tokio::test]
    async fn entitlement_route_uses_expiry_aware_check() {
        let mut stale = UserEntitlement::new_free(Uuid::new_v4(), "p@example.com");
        stale.is_premium = true;
        stale.premium_expires_at = Some(Utc::now() - Duration::days(1));
        let h = harness(vec![stale.clone()]);

        let resp = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/billing/entitlement")
                    .header(header::AUTHORIZATION, bearer(&h.state, stale.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["is_premium"], false);
        assert_eq!(json["premium"]["state"], "free");
    }

    #[tokio::test]
    async fn webhook_grants_premium_and_acknowledges() {
        let user = UserEntitlement::new_free(Uuid::new_v4(), "p@example.com");
        let h = harness(vec![user.clone()]);
        let end = Utc::now() + Duration::days(30);
        let payload = json!({
            "id": "evt_route",
            "type": "invoice.paid",
            "data": { "object": {
                "customer_email": "P@example.com",
                "subscription": "sub_route",
                "amount_paid": 999,
                "lines": { "data": [ { "period": { "end": end.timestamp() } } ] }
            } }
        });

        let resp = h.app.clone().oneshot(signed_webhook(&payload)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "received": true }));

        let stored = h.db.get(user.id).unwrap();
        assert!(stored.is_premium);
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_route"));
        assert_eq!(
            stored.premium_expires_at.map(|t| t.timestamp()),
            Some(end.timestamp())
        );
    }

    #[tokio::test]
    async fn webhook_status_codes() {
        let h = harness(vec![]);
        let ignored = json!({ "id": "evt_i", "type": "payment_intent.created", "data": { "object": {} } });

        let resp = h.app.clone().oneshot(signed_webhook(&ignored)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = h.app.clone().oneshot(webhook_request(&ignored, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = h
            .app
            .clone()
            .oneshot(webhook_request(&ignored, Some("t=1,v1=abcd".into())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn webhook_persistence_failure_is_server_error() {
        let db = Arc::new(MockDb {
            should_fail: true,
            ..Default::default()
        });
        let app = api_router(test_state(db, MockStripeService::new()));
        let payload = json!({
            "id": "evt_db",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_1" } }
        });
        let resp = app.oneshot(signed_webhook(&payload)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
