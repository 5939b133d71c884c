//! Premium entitlement lifecycle.
//!
//! Provider webhooks flow through [`normalizer`] and [`reconciler`] into the
//! entitlement store; [`checkout`] drives user-initiated purchases and
//! cancellations; [`gate`] is the only predicate feature gating may use.

pub mod checkout;
pub mod error;
pub mod gate;
pub mod normalizer;
pub mod reconciler;
pub mod sweep;
pub mod webhook;

pub use checkout::{CheckoutCoordinator, CheckoutResponse, SessionStatus};
pub use error::{BillingError, BillingResult, ErrorClass};
pub use gate::{is_entitled, is_entitled_at, premium_state_at, PremiumState};
pub use normalizer::{EventNormalizer, NormalizeError};
pub use reconciler::{DropReason, EntitlementReconciler, ReconcileOutcome};
pub use webhook::{WebhookOutcome, WebhookProcessor};
