use chrono::{DateTime, Utc};

/// The subset of provider events that move entitlement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEventKind {
    PaymentSucceeded,
    SubscriptionCanceled,
}

impl BillingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventKind::PaymentSucceeded => "payment_succeeded",
            BillingEventKind::SubscriptionCanceled => "subscription_canceled",
        }
    }
}

/// A verified, decoded webhook event. Built per inbound call and dropped
/// once reconciliation finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEvent {
    pub kind: BillingEventKind,
    pub provider_event_id: String,
    pub customer_email: Option<String>,
    /// Provider customer id, only used to look up a missing email.
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub period_end: Option<DateTime<Utc>>,
    pub amount_minor_units: Option<i64>,
}
