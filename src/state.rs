use crate::config::Config;
use crate::db::entitlement_repository::EntitlementRepository;
use crate::services::billing::{CheckoutCoordinator, WebhookProcessor};
use crate::services::stripe::StripeService;
use crate::utils::jwt::JwtKeys;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn EntitlementRepository>,
    pub config: Arc<Config>,
    pub jwt_keys: Arc<JwtKeys>,
    pub checkout: Arc<CheckoutCoordinator>,
    pub webhooks: Arc<WebhookProcessor>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn EntitlementRepository>,
        stripe: Arc<dyn StripeService>,
        config: Arc<Config>,
        jwt_keys: Arc<JwtKeys>,
    ) -> Self {
        let checkout = Arc::new(CheckoutCoordinator::from_config(
            db.clone(),
            stripe.clone(),
            &config,
        ));
        let webhooks = Arc::new(WebhookProcessor::from_config(db.clone(), stripe, &config));
        Self {
            db,
            config,
            jwt_keys,
            checkout,
            webhooks,
        }
    }
}
