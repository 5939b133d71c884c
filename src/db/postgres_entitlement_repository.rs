use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::entitlement_repository::EntitlementRepository;
use crate::models::entitlement::{EntitlementUpdate, UserEntitlement};

const ENTITLEMENT_COLUMNS: &str = "id, email, stripe_customer_id, stripe_subscription_id, \
     is_premium, premium_expires_at";

pub struct PostgresEntitlementRepository {
    pub pool: PgPool,
}

#[async_trait]
impl EntitlementRepository for PostgresEntitlementRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntitlement>, sqlx::Error> {
        sqlx::query_as::<_, UserEntitlement>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntitlement>, sqlx::Error> {
        sqlx::query_as::<_, UserEntitlement>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error> {
        sqlx::query_as::<_, UserEntitlement>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM users WHERE stripe_subscription_id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update(
        &self,
        user_id: Uuid,
        update: EntitlementUpdate,
    ) -> Result<Option<UserEntitlement>, sqlx::Error> {
        // Flag/value pairs keep the partial update in one statement.
        sqlx::query_as::<_, UserEntitlement>(&format!(
            r#"
            UPDATE users SET
                is_premium = CASE WHEN $2 THEN $3 ELSE is_premium END,
                stripe_subscription_id = CASE WHEN $4 THEN $5 ELSE stripe_subscription_id END,
                premium_expires_at = CASE WHEN $6 THEN $7 ELSE premium_expires_at END,
                updated_at = now()
            WHERE id = $1
            RETURNING {ENTITLEMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(update.is_premium.is_some())
        .bind(update.is_premium)
        .bind(update.stripe_subscription_id.is_some())
        .bind(update.stripe_subscription_id.flatten())
        .bind(update.premium_expires_at.is_some())
        .bind(update.premium_expires_at.flatten())
        .fetch_optional(&self.pool)
        .await
    }

    async fn revoke_if_subscription_matches(
        &self,
        user_id: Uuid,
        subscription_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error> {
        sqlx::query_as::<_, UserEntitlement>(&format!(
            r#"
            UPDATE users SET
                is_premium = false,
                premium_expires_at = NULL,
                stripe_subscription_id = NULL,
                updated_at = now()
            WHERE id = $1 AND stripe_subscription_id = $2
            RETURNING {ENTITLEMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn bind_customer_id(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error> {
        sqlx::query_as::<_, UserEntitlement>(&format!(
            r#"
            UPDATE users SET stripe_customer_id = $2, updated_at = now()
            WHERE id = $1 AND stripe_customer_id IS NULL
            RETURNING {ENTITLEMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn link_subscription_if_absent(
        &self,
        user_id: Uuid,
        subscription_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users SET stripe_subscription_id = $2, updated_at = now()
            WHERE id = $1 AND stripe_subscription_id IS NULL
            "#,
        )
        .bind(user_id)
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_expired_premium(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                is_premium = false,
                stripe_subscription_id = NULL,
                updated_at = now()
            WHERE is_premium = true AND premium_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
