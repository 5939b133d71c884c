use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::BillingResult;
use crate::db::entitlement_repository::EntitlementRepository;
use crate::models::billing_event::{BillingEvent, BillingEventKind};
use crate::models::entitlement::EntitlementUpdate;
use crate::models::plan::Plan;

/// Amounts (minor units) of the published price points, used to infer a
/// period length when the provider omits one.
pub const MONTHLY_PRICE_MINOR: i64 = 999;
pub const QUARTERLY_PRICE_MINOR: i64 = 1499;
pub const YEARLY_PRICE_MINOR: i64 = 7999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Payment for an email with no local account.
    UnknownCustomer,
    /// Payment without any customer email to resolve.
    MissingCustomerEmail,
    /// Payment or cancellation without a subscription id.
    NoSubscription,
    /// Cancellation for a subscription no user holds.
    UnknownSubscription,
    /// Cancellation whose subscription was replaced before the update ran.
    StaleCancellation,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::UnknownCustomer => "unknown_customer",
            DropReason::MissingCustomerEmail => "missing_customer_email",
            DropReason::NoSubscription => "no_subscription",
            DropReason::UnknownSubscription => "unknown_subscription",
            DropReason::StaleCancellation => "stale_cancellation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Granted {
        user_id: Uuid,
        subscription_id: String,
        expires_at: DateTime<Utc>,
    },
    Revoked {
        user_id: Uuid,
        subscription_id: String,
    },
    Dropped(DropReason),
}

/// Applies normalized billing events to the entitlement store.
///
/// Payments are full-state overwrites, so replays converge. Cancellations
/// are conditional on the stored subscription id, so a late cancellation
/// for a replaced subscription cannot clear the new one.
#[derive(Clone)]
pub struct EntitlementReconciler {
    repo: Arc<dyn EntitlementRepository>,
}

impl EntitlementReconciler {
    pub fn new(repo: Arc<dyn EntitlementRepository>) -> Self {
        Self { repo }
    }

    pub async fn apply(&self, event: &BillingEvent) -> BillingResult<ReconcileOutcome> {
        self.apply_at(event, Utc::now()).await
    }

    pub async fn apply_at(
        &self,
        event: &BillingEvent,
        now: DateTime<Utc>,
    ) -> BillingResult<ReconcileOutcome> {
        let outcome = match event.kind {
            BillingEventKind::PaymentSucceeded => self.apply_payment(event, now).await?,
            BillingEventKind::SubscriptionCanceled => self.apply_cancellation(event).await?,
        };

        match &outcome {
            ReconcileOutcome::Dropped(reason) => info!(
                event_id = %event.provider_event_id,
                kind = event.kind.as_str(),
                reason = reason.as_str(),
                "billing event dropped"
            ),
            ReconcileOutcome::Granted {
                user_id,
                expires_at,
                ..
            } => info!(
                event_id = %event.provider_event_id,
                %user_id,
                %expires_at,
                "premium granted"
            ),
            ReconcileOutcome::Revoked {
                user_id,
                subscription_id,
            } => info!(
                event_id = %event.provider_event_id,
                %user_id,
                %subscription_id,
                "premium revoked"
            ),
        }
        Ok(outcome)
    }

    async fn apply_payment(
        &self,
        event: &BillingEvent,
        now: DateTime<Utc>,
    ) -> BillingResult<ReconcileOutcome> {
        // A grant must never clear the stored subscription id.
        let Some(subscription_id) = event.subscription_id.as_deref() else {
            return Ok(ReconcileOutcome::Dropped(DropReason::NoSubscription));
        };
        let Some(email) = event.customer_email.as_deref() else {
            return Ok(ReconcileOutcome::Dropped(DropReason::MissingCustomerEmail));
        };
        let Some(user) = self.repo.find_by_email(email).await? else {
            return Ok(ReconcileOutcome::Dropped(DropReason::UnknownCustomer));
        };

        let expires_at = resolve_period_end(event.period_end, event.amount_minor_units, now);
        let update = EntitlementUpdate::grant(Some(subscription_id.to_string()), expires_at);
        match self.repo.update(user.id, update).await? {
            Some(_) => Ok(ReconcileOutcome::Granted {
                user_id: user.id,
                subscription_id: subscription_id.to_string(),
                expires_at,
            }),
            // Deleted between lookup and update.
            None => Ok(ReconcileOutcome::Dropped(DropReason::UnknownCustomer)),
        }
    }

    async fn apply_cancellation(&self, event: &BillingEvent) -> BillingResult<ReconcileOutcome> {
        let Some(subscription_id) = event.subscription_id.as_deref() else {
            return Ok(ReconcileOutcome::Dropped(DropReason::NoSubscription));
        };
        let Some(user) = self.repo.find_by_subscription_id(subscription_id).await? else {
            return Ok(ReconcileOutcome::Dropped(DropReason::UnknownSubscription));
        };

        match self
            .repo
            .revoke_if_subscription_matches(user.id, subscription_id)
            .await?
        {
            Some(_) => Ok(ReconcileOutcome::Revoked {
                user_id: user.id,
                subscription_id: subscription_id.to_string(),
            }),
            None => {
                warn!(
                    user_id = %user.id,
                    subscription_id,
                    "subscription replaced before cancellation applied"
                );
                Ok(ReconcileOutcome::Dropped(DropReason::StaleCancellation))
            }
        }
    }
}

/// The event's own period end when present, otherwise a duration inferred
/// from the amount paid.
pub fn resolve_period_end(
    period_end: Option<DateTime<Utc>>,
    amount_minor_units: Option<i64>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    period_end.unwrap_or_else(|| fallback_period_end(amount_minor_units, now))
}

pub fn fallback_period_end(amount_minor_units: Option<i64>, now: DateTime<Utc>) -> DateTime<Utc> {
    let plan = match amount_minor_units {
        Some(MONTHLY_PRICE_MINOR) => Plan::Monthly,
        Some(QUARTERLY_PRICE_MINOR) => Plan::Quarterly,
        Some(YEARLY_PRICE_MINOR) => Plan::Yearly,
        // unknown price point
        _ => Plan::Monthly,
    };
    // Clamps to the last day of the target month.
    now.checked_add_months(Months::new(plan.billing_months()))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
