// NOTE: async-stripe is compiled with a minimal feature set (runtime-tokio-hyper, checkout
// and billing). Webhook signatures are checked in billing::normalizer, not via
// webhook-events. Touching APIs outside those features requires updating Cargo.toml.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StripeServiceError {
    #[error("stripe api error: {0}")]
    Api(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("stripe request timed out after {0:?}")]
    Timeout(Duration),
    #[error("other error: {0}")]
    Other(String),
}

impl From<stripe::StripeError> for StripeServiceError {
    fn from(err: stripe::StripeError) -> Self {
        StripeServiceError::Api(err.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateCheckoutSessionRequest {
    pub success_url: String,
    pub cancel_url: String,
    pub price_id: String,
    pub client_reference_id: Option<String>,
    pub customer: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Read-back view of a checkout session held by the provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSessionDetails {
    pub id: String,
    pub payment_status: String,
    pub subscription_id: Option<String>,
    pub client_reference_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerInfo {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: String,
    pub status: String,
    /// Unix timestamp (seconds) when the current period ends
    pub current_period_end: i64,
}

/// Provider operations the billing core depends on. Constructed once at
/// startup and passed around as `Arc<dyn StripeService>`.
#[async_trait]
pub trait StripeService: Send + Sync {
    async fn create_customer(
        &self,
        email: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, StripeServiceError>;

    async fn retrieve_customer(&self, customer_id: &str)
        -> Result<CustomerInfo, StripeServiceError>;

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionDetails, StripeServiceError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError>;

    async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<(), StripeServiceError>;
}

/// Bounds a provider call so an unreachable provider fails the request
/// instead of hanging it.
pub async fn call_with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StripeServiceError>
where
    F: Future<Output = Result<T, StripeServiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StripeServiceError::Timeout(limit)),
    }
}

mod live;
#[cfg(test)]
mod mock;

pub use live::LiveStripeService;
#[cfg(test)]
pub use mock::MockStripeService;
