use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{BillingError, BillingResult};
use super::gate::is_entitled;
use crate::config::{Config, PriceCatalog};
use crate::db::entitlement_repository::EntitlementRepository;
use crate::models::entitlement::UserEntitlement;
use crate::models::plan::Plan;
use crate::services::stripe::{call_with_timeout, CreateCheckoutSessionRequest, StripeService};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub payment_status: String,
    pub subscription_id: Option<String>,
}

/// User-initiated purchase and cancellation. Never grants premium; that
/// only happens when the payment webhook is reconciled.
#[derive(Clone)]
pub struct CheckoutCoordinator {
    repo: Arc<dyn EntitlementRepository>,
    stripe: Arc<dyn StripeService>,
    prices: PriceCatalog,
    success_url: String,
    cancel_url: String,
    timeout: Duration,
}

impl CheckoutCoordinator {
    pub fn new(
        repo: Arc<dyn EntitlementRepository>,
        stripe: Arc<dyn StripeService>,
        prices: PriceCatalog,
        success_url: String,
        cancel_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            stripe,
            prices,
            success_url,
            cancel_url,
            timeout,
        }
    }

    pub fn from_config(
        repo: Arc<dyn EntitlementRepository>,
        stripe: Arc<dyn StripeService>,
        config: &Config,
    ) -> Self {
        Self::new(
            repo,
            stripe,
            config.prices.clone(),
            config.checkout_success_url(),
            config.checkout_cancel_url(),
            config.stripe.request_timeout,
        )
    }

    pub async fn create_checkout(
        &self,
        user_id: Uuid,
        plan: &str,
    ) -> BillingResult<CheckoutResponse> {
        let plan: Plan = plan
            .parse()
            .map_err(|_| BillingError::InvalidPlan(plan.to_string()))?;

        let user = self
            .repo
            .find_by_id(user_id)
            .await?
            .ok_or(BillingError::UserNotFound)?;

        if is_entitled(&user) {
            return Err(BillingError::AlreadyPremium);
        }

        let customer_id = self.ensure_customer(&user).await?;

        let metadata: BTreeMap<String, String> = [
            ("user_id".to_string(), user_id.to_string()),
            ("plan".to_string(), plan.as_str().to_string()),
        ]
        .into_iter()
        .collect();

        let req = CreateCheckoutSessionRequest {
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            price_id: self.prices.price_id(plan).to_string(),
            client_reference_id: Some(user_id.to_string()),
            customer: Some(customer_id),
            metadata,
        };

        let session = call_with_timeout(self.timeout, self.stripe.create_checkout_session(req))
            .await
            .map_err(|err| {
                error!(?err, %user_id, %plan, "failed to create checkout session");
                BillingError::Provider(err)
            })?;

        info!(%user_id, %plan, session_id = %session.id, "checkout session created");
        Ok(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        })
    }

    /// Returns the user's provider customer id, creating and binding one on
    /// first checkout.
    async fn ensure_customer(&self, user: &UserEntitlement) -> BillingResult<String> {
        if let Some(existing) = &user.stripe_customer_id {
            return Ok(existing.clone());
        }

        let metadata: BTreeMap<String, String> =
            [("user_id".to_string(), user.id.to_string())].into_iter().collect();
        let created = call_with_timeout(
            self.timeout,
            self.stripe.create_customer(&user.email, metadata),
        )
        .await?;

        if self.repo.bind_customer_id(user.id, &created).await?.is_some() {
            return Ok(created);
        }

        // A concurrent checkout bound first; use the stored customer.
        let stored = self
            .repo
            .find_by_id(user.id)
            .await?
            .ok_or(BillingError::UserNotFound)?
            .stripe_customer_id;
        match stored {
            Some(id) => {
                warn!(
                    user_id = %user.id,
                    orphaned = %created,
                    "customer already bound, reusing stored id"
                );
                Ok(id)
            }
            None => Err(BillingError::UserNotFound),
        }
    }

    /// Status of a session the caller started. Sessions owned by another
    /// user are reported as not found.
    pub async fn get_session_status(
        &self,
        caller: Uuid,
        session_id: &str,
    ) -> BillingResult<SessionStatus> {
        if !is_valid_session_id(session_id) {
            return Err(BillingError::InvalidSessionId);
        }

        let session = call_with_timeout(
            self.timeout,
            self.stripe.retrieve_checkout_session(session_id),
        )
        .await?;

        let user_id = session
            .metadata
            .get("user_id")
            .or(session.client_reference_id.as_ref())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or(BillingError::SessionNotFound)?;
        if user_id != caller {
            warn!(%caller, session_id, "session status requested by non-owner");
            return Err(BillingError::SessionNotFound);
        }

        let user = self
            .repo
            .find_by_id(user_id)
            .await?
            .ok_or(BillingError::UserNotFound)?;

        if let Some(subscription_id) = session.subscription_id.as_deref() {
            if user.stripe_subscription_id.is_none() {
                // Best effort: the payment webhook stays authoritative.
                match self
                    .repo
                    .link_subscription_if_absent(user_id, subscription_id)
                    .await
                {
                    Ok(true) => info!(%user_id, subscription_id, "linked subscription from session"),
                    Ok(false) => {}
                    Err(err) => warn!(?err, %user_id, "failed to link subscription from session"),
                }
            }
        }

        Ok(SessionStatus {
            payment_status: session.payment_status,
            subscription_id: session.subscription_id,
        })
    }

    pub async fn cancel_subscription(&self, user_id: Uuid) -> BillingResult<()> {
        let user = self
            .repo
            .find_by_id(user_id)
            .await?
            .ok_or(BillingError::UserNotFound)?;

        let subscription_id = user
            .stripe_subscription_id
            .ok_or(BillingError::NoActiveSubscription)?;

        call_with_timeout(
            self.timeout,
            self.stripe.cancel_subscription_immediately(&subscription_id),
        )
        .await
        .map_err(|err| {
            error!(?err, %user_id, %subscription_id, "provider cancellation failed");
            BillingError::Provider(err)
        })?;

        // The cancellation webhook converges to the same state later.
        if self
            .repo
            .revoke_if_subscription_matches(user_id, &subscription_id)
            .await?
            .is_none()
        {
            warn!(%user_id, %subscription_id, "subscription changed during cancellation");
        }

        info!(%user_id, %subscription_id, "subscription cancelled");
        Ok(())
    }
}

/// Provider checkout session ids look like `cs_test_a1B2...`.
pub fn is_valid_session_id(session_id: &str) -> bool {
    match session_id.strip_prefix("cs_") {
        Some(rest) => {
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}
