use super::{
    CheckoutSession, CheckoutSessionDetails, CreateCheckoutSessionRequest, CustomerInfo,
    StripeService, StripeServiceError, SubscriptionInfo,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scriptable stand-in for the provider. `fail_with` turns every call into
/// an API error; `delay` makes every call sleep first.
#[derive(Clone, Default)]
pub struct MockStripeService {
    pub created_customers: Arc<Mutex<Vec<(String, BTreeMap<String, String>)>>>,
    pub customers: Arc<Mutex<HashMap<String, CustomerInfo>>>,
    pub created_sessions: Arc<Mutex<Vec<CheckoutSession>>>,
    pub last_create_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    pub sessions: Arc<Mutex<HashMap<String, CheckoutSessionDetails>>>,
    pub subscriptions: Arc<Mutex<HashMap<String, SubscriptionInfo>>>,
    pub cancelled: Arc<Mutex<Vec<String>>>,
    pub fail_with: Arc<Mutex<Option<String>>>,
    pub delay: Arc<Mutex<Option<Duration>>>,
    next_id: Arc<AtomicU64>,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(self, id: &str, email: Option<&str>) -> Self {
        self.customers.lock().unwrap().insert(
            id.to_string(),
            CustomerInfo {
                id: id.to_string(),
                email: email.map(str::to_string),
            },
        );
        self
    }

    pub fn with_session(self, session: CheckoutSessionDetails) -> Self {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
        self
    }

    pub fn with_subscription(self, id: &str, current_period_end: i64) -> Self {
        self.subscriptions.lock().unwrap().insert(
            id.to_string(),
            SubscriptionInfo {
                id: id.to_string(),
                status: "active".into(),
                current_period_end,
            },
        );
        self
    }

    pub fn failing(self, message: &str) -> Self {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn delayed(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    fn make_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{}", prefix, n)
    }

    async fn before_call(&self) -> Result<(), StripeServiceError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.fail_with.lock().unwrap().clone() {
            Some(msg) => Err(StripeServiceError::Api(msg)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_customer(
        &self,
        email: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, StripeServiceError> {
        self.before_call().await?;
        let id = self.make_id("cus_test");
        self.created_customers
            .lock()
            .unwrap()
            .push((email.to_string(), metadata));
        self.customers.lock().unwrap().insert(
            id.clone(),
            CustomerInfo {
                id: id.clone(),
                email: Some(email.to_string()),
            },
        );
        Ok(id)
    }

    async fn retrieve_customer(
        &self,
        customer_id: &str,
    ) -> Result<CustomerInfo, StripeServiceError> {
        self.before_call().await?;
        self.customers
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned()
            .ok_or_else(|| StripeServiceError::NotFound(format!("customer {}", customer_id)))
    }

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        self.before_call().await?;
        // capture the request
        self.last_create_requests.lock().unwrap().push(req.clone());

        let session = CheckoutSession {
            id: self.make_id("cs_test"),
            url: Some("https://example.test/checkout".into()),
        };
        self.created_sessions.lock().unwrap().push(session.clone());
        self.sessions.lock().unwrap().insert(
            session.id.clone(),
            CheckoutSessionDetails {
                id: session.id.clone(),
                payment_status: "unpaid".into(),
                subscription_id: None,
                client_reference_id: req.client_reference_id.clone(),
                metadata: req.metadata.clone(),
            },
        );
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionDetails, StripeServiceError> {
        self.before_call().await?;
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| StripeServiceError::NotFound(format!("session {}", session_id)))
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        self.before_call().await?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| {
                StripeServiceError::NotFound(format!("subscription {}", subscription_id))
            })
    }

    async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<(), StripeServiceError> {
        self.before_call().await?;
        self.cancelled
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        if let Some(sub) = self.subscriptions.lock().unwrap().get_mut(subscription_id) {
            sub.status = "canceled".into();
        }
        Ok(())
    }
}
