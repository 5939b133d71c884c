use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::entitlement::{EntitlementUpdate, UserEntitlement};

/// Durable per-user entitlement record. Every method touches at most one
/// row and runs as a single statement, except the bulk expiry sweep.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntitlement>, sqlx::Error>;

    /// Case-insensitive exact match on the account email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntitlement>, sqlx::Error>;

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error>;

    async fn update(
        &self,
        user_id: Uuid,
        update: EntitlementUpdate,
    ) -> Result<Option<UserEntitlement>, sqlx::Error>;

    /// Clears premium fields only while the stored subscription id still
    /// equals `subscription_id`. Returns `None` when it no longer does.
    async fn revoke_if_subscription_matches(
        &self,
        user_id: Uuid,
        subscription_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error>;

    /// One-time binding of the provider customer. Returns `None` when the
    /// user already has a customer id (or does not exist).
    async fn bind_customer_id(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error>;

    /// Records a subscription id when none is stored. Returns whether a row
    /// changed.
    async fn link_subscription_if_absent(
        &self,
        user_id: Uuid,
        subscription_id: &str,
    ) -> Result<bool, sqlx::Error>;

    /// Drops the cached premium flag for every row whose expiry is at or
    /// before `now`. Returns the number of rows changed.
    async fn clear_expired_premium(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error>;
}
