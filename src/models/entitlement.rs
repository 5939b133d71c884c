use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Premium-related columns of a user row.
///
/// `is_premium` is a cache that can outlive `premium_expires_at`; read it
/// through [`crate::services::billing::gate::is_entitled`], never directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserEntitlement {
    pub id: Uuid,
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
}

impl UserEntitlement {
    pub fn new_free(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            is_premium: false,
            premium_expires_at: None,
        }
    }
}

/// Partial update of entitlement fields. `None` leaves a column untouched;
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitlementUpdate {
    pub is_premium: Option<bool>,
    pub stripe_subscription_id: Option<Option<String>>,
    pub premium_expires_at: Option<Option<DateTime<Utc>>>,
}

impl EntitlementUpdate {
    /// Full-state overwrite applied on a successful payment.
    pub fn grant(subscription_id: Option<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            is_premium: Some(true),
            stripe_subscription_id: Some(subscription_id),
            premium_expires_at: Some(Some(expires_at)),
        }
    }

    pub fn revoke() -> Self {
        Self {
            is_premium: Some(false),
            stripe_subscription_id: Some(None),
            premium_expires_at: Some(None),
        }
    }

    pub fn apply_to(&self, entitlement: &mut UserEntitlement) {
        if let Some(is_premium) = self.is_premium {
            entitlement.is_premium = is_premium;
        }
        if let Some(ref subscription_id) = self.stripe_subscription_id {
            entitlement.stripe_subscription_id = subscription_id.clone();
        }
        if let Some(expires_at) = self.premium_expires_at {
            entitlement.premium_expires_at = expires_at;
        }
    }
}
