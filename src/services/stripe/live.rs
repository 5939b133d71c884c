use super::{
    CheckoutSession, CheckoutSessionDetails, CreateCheckoutSessionRequest, CustomerInfo,
    StripeService, StripeServiceError, SubscriptionInfo,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

pub struct LiveStripeService {
    client: stripe::Client,
}

impl LiveStripeService {
    pub fn new(secret_key: impl Into<String>) -> Self {
        let client = stripe::Client::new(secret_key);
        Self { client }
    }

    pub fn from_settings(settings: &crate::config::StripeSettings) -> Self {
        Self::new(settings.secret_key.clone())
    }
}

fn parse_id<T>(raw: &str) -> Result<T, StripeServiceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StripeServiceError::Other(e.to_string()))
}

fn to_metadata(meta: &BTreeMap<String, String>) -> HashMap<String, String> {
    meta.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[async_trait]
impl StripeService for LiveStripeService {
    async fn create_customer(
        &self,
        email: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, StripeServiceError> {
        let mut params = stripe::CreateCustomer::new();
        params.email = Some(email);
        if !metadata.is_empty() {
            params.metadata = Some(to_metadata(&metadata));
        }
        let customer = stripe::Customer::create(&self.client, params).await?;
        Ok(customer.id.to_string())
    }

    async fn retrieve_customer(
        &self,
        customer_id: &str,
    ) -> Result<CustomerInfo, StripeServiceError> {
        let id = parse_id::<stripe::CustomerId>(customer_id)?;
        let customer = stripe::Customer::retrieve(&self.client, &id, &[]).await?;
        Ok(CustomerInfo {
            id: customer.id.to_string(),
            email: customer.email,
        })
    }

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Subscription);
        params.success_url = Some(req.success_url.as_str());
        params.cancel_url = Some(req.cancel_url.as_str());
        if let Some(ref id) = req.client_reference_id {
            params.client_reference_id = Some(id.as_str());
        }
        if let Some(ref customer) = req.customer {
            params.customer = Some(parse_id::<stripe::CustomerId>(customer)?);
        }
        if !req.metadata.is_empty() {
            params.metadata = Some(to_metadata(&req.metadata));
        }
        params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(req.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = stripe::CheckoutSession::create(&self.client, params).await?;
        Ok(CheckoutSession {
            id: session.id.to_string(),
            url: session.url.clone(),
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionDetails, StripeServiceError> {
        let id = parse_id::<stripe::CheckoutSessionId>(session_id)?;
        let session = stripe::CheckoutSession::retrieve(&self.client, &id, &[]).await?;
        Ok(CheckoutSessionDetails {
            id: session.id.to_string(),
            payment_status: session.payment_status.as_str().to_string(),
            subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
            client_reference_id: session.client_reference_id.clone(),
            metadata: session
                .metadata
                .unwrap_or_default()
                .into_iter()
                .collect(),
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        let id = parse_id::<stripe::SubscriptionId>(subscription_id)?;
        let sub = stripe::Subscription::retrieve(&self.client, &id, &[]).await?;
        Ok(SubscriptionInfo {
            id: sub.id.to_string(),
            status: sub.status.to_string(),
            current_period_end: sub.current_period_end,
        })
    }

    async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<(), StripeServiceError> {
        let id = parse_id::<stripe::SubscriptionId>(subscription_id)?;
        stripe::Subscription::cancel(&self.client, &id, Default::default()).await?;
        Ok(())
    }
}
