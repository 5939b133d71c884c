use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::error::{BillingError, BillingResult};
use super::normalizer::{timestamp_to_datetime, EventNormalizer, NormalizeError};
use super::reconciler::{EntitlementReconciler, ReconcileOutcome};
use crate::config::Config;
use crate::db::entitlement_repository::EntitlementRepository;
use crate::models::billing_event::{BillingEvent, BillingEventKind};
use crate::services::stripe::{call_with_timeout, StripeService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Reconciled(ReconcileOutcome),
    /// Acknowledged without touching any entitlement.
    Ignored { reason: String },
}

/// Runs an inbound webhook through verification, enrichment and
/// reconciliation. `Err` means the provider should retry (or, for
/// `Authentication`, that the request was not from the provider).
#[derive(Clone)]
pub struct WebhookProcessor {
    normalizer: EventNormalizer,
    reconciler: EntitlementReconciler,
    stripe: Arc<dyn StripeService>,
    timeout: Duration,
}

impl WebhookProcessor {
    pub fn new(
        normalizer: EventNormalizer,
        reconciler: EntitlementReconciler,
        stripe: Arc<dyn StripeService>,
        timeout: Duration,
    ) -> Self {
        Self {
            normalizer,
            reconciler,
            stripe,
            timeout,
        }
    }

    pub fn from_config(
        repo: Arc<dyn EntitlementRepository>,
        stripe: Arc<dyn StripeService>,
        config: &Config,
    ) -> Self {
        Self::new(
            EventNormalizer::from_settings(&config.stripe),
            EntitlementReconciler::new(repo),
            stripe,
            config.stripe.request_timeout,
        )
    }

    pub async fn process(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> BillingResult<WebhookOutcome> {
        let event = match self.normalizer.normalize(payload, signature_header) {
            Ok(event) => event,
            Err(NormalizeError::InvalidSignature(reason)) => {
                warn!(reason, "stripe webhook verification failed");
                return Err(BillingError::Authentication);
            }
            Err(err @ NormalizeError::UnrecognizedEventType(_)) => {
                info!(%err, "unhandled stripe event acknowledged");
                return Ok(WebhookOutcome::Ignored {
                    reason: err.to_string(),
                });
            }
            Err(err @ NormalizeError::MalformedPayload(_)) => {
                warn!(%err, "undecodable stripe event acknowledged");
                return Ok(WebhookOutcome::Ignored {
                    reason: err.to_string(),
                });
            }
        };

        let event = self.enrich(event).await?;
        let outcome = self.reconciler.apply(&event).await?;
        Ok(WebhookOutcome::Reconciled(outcome))
    }

    /// Fills in fields some invoice shapes leave out. A missing email
    /// blocks reconciliation, so failing to fetch it is retryable; a
    /// missing period end only degrades to the amount table.
    async fn enrich(&self, mut event: BillingEvent) -> BillingResult<BillingEvent> {
        if event.kind != BillingEventKind::PaymentSucceeded || event.subscription_id.is_none() {
            return Ok(event);
        }

        if event.customer_email.is_none() {
            if let Some(customer_id) = event.customer_id.as_deref() {
                let customer =
                    call_with_timeout(self.timeout, self.stripe.retrieve_customer(customer_id))
                        .await
                        .map_err(|err| {
                            warn!(?err, customer_id, "failed to load customer for invoice");
                            BillingError::Provider(err)
                        })?;
                event.customer_email = customer.email.filter(|e| !e.trim().is_empty());
            }
        }

        if event.period_end.is_none() {
            if let Some(subscription_id) = event.subscription_id.as_deref() {
                match call_with_timeout(
                    self.timeout,
                    self.stripe.retrieve_subscription(subscription_id),
                )
                .await
                {
                    Ok(sub) => event.period_end = timestamp_to_datetime(sub.current_period_end),
                    Err(err) => warn!(
                        ?err,
                        subscription_id,
                        "failed to load subscription period, using amount fallback"
                    ),
                }
            }
        }

        Ok(event)
    }
}
