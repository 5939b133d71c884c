//! Verification and decoding of provider webhook payloads.
//!
//! The signature is checked against the exact request bytes before any
//! JSON is parsed, using Stripe's `Stripe-Signature` scheme (the same
//! `t=<unix>,v1=<hex>` HMAC-SHA256 check `stripe::Webhook::construct_event`
//! performs). Decoding then goes through a tagged enum, so event kinds
//! we do not handle land in [`NormalizeError::UnrecognizedEventType`]
//! instead of being probed field by field.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::StripeSettings;
use crate::models::billing_event::{BillingEvent, BillingEventKind};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("webhook signature verification failed: {0}")]
    InvalidSignature(&'static str),
    /// Signed and well-formed, but not an event kind we act on.
    #[error("unrecognized event type: {0}")]
    UnrecognizedEventType(String),
    /// Signed, but the body does not decode into the expected shape.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

#[derive(Clone)]
pub struct EventNormalizer {
    secret: String,
    tolerance_seconds: i64,
}

impl std::fmt::Debug for EventNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNormalizer")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish_non_exhaustive()
    }
}

impl EventNormalizer {
    pub fn new(secret: impl Into<String>, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds,
        }
    }

    pub fn from_settings(settings: &StripeSettings) -> Self {
        Self::new(
            settings.webhook_secret.clone(),
            settings.webhook_tolerance_seconds,
        )
    }

    pub fn normalize(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<BillingEvent, NormalizeError> {
        self.normalize_at(payload, signature_header, Utc::now())
    }

    pub fn normalize_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<BillingEvent, NormalizeError> {
        self.verify_signature(payload, signature_header, now)?;
        decode_event(payload)
    }

    fn verify_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), NormalizeError> {
        // Header shape: t=<unix>,v1=<hex>[,v1=<hex>...][,v0=...]
        let mut timestamp: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(NormalizeError::InvalidSignature("missing timestamp"))?;
        let signed_at: i64 = timestamp
            .parse()
            .map_err(|_| NormalizeError::InvalidSignature("malformed timestamp"))?;
        if candidates.is_empty() {
            return Err(NormalizeError::InvalidSignature("missing v1 signature"));
        }
        // `t` is attacker-controlled; abs_diff cannot overflow.
        let tolerance = u64::try_from(self.tolerance_seconds).unwrap_or(0);
        if now.timestamp().abs_diff(signed_at) > tolerance {
            return Err(NormalizeError::InvalidSignature(
                "timestamp outside tolerance",
            ));
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| NormalizeError::InvalidSignature("unusable webhook secret"))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|provided| bool::from(provided.as_slice().ct_eq(expected.as_slice())))
                .unwrap_or(false)
        });
        if matched {
            Ok(())
        } else {
            Err(NormalizeError::InvalidSignature("signature mismatch"))
        }
    }
}

#[derive(Deserialize)]
struct EventHeader {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ProviderEvent {
    #[serde(rename = "invoice.paid", alias = "invoice.payment_succeeded")]
    InvoicePaid {
        id: String,
        data: EventData<InvoiceObject>,
    },
    #[serde(rename = "customer.subscription.deleted")]
    SubscriptionDeleted {
        id: String,
        data: EventData<SubscriptionObject>,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Deserialize)]
struct EventData<T> {
    object: T,
}

/// Either a bare id or an expanded object carrying one.
#[derive(Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct InvoiceObject {
    customer: Option<Expandable>,
    customer_email: Option<String>,
    amount_paid: Option<i64>,
    subscription: Option<Expandable>,
    parent: Option<InvoiceParent>,
    lines: Option<InvoiceLines>,
}

#[derive(Deserialize)]
struct InvoiceParent {
    subscription_details: Option<SubscriptionDetails>,
}

#[derive(Deserialize)]
struct SubscriptionDetails {
    subscription: Option<Expandable>,
}

#[derive(Deserialize)]
struct InvoiceLines {
    #[serde(default)]
    data: Vec<InvoiceLine>,
}

#[derive(Deserialize)]
struct InvoiceLine {
    period: Option<LinePeriod>,
}

#[derive(Deserialize)]
struct LinePeriod {
    end: Option<i64>,
}

#[derive(Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: Option<Expandable>,
}

fn decode_event(payload: &[u8]) -> Result<BillingEvent, NormalizeError> {
    let header: EventHeader = serde_json::from_slice(payload)
        .map_err(|e| NormalizeError::MalformedPayload(e.to_string()))?;
    let event: ProviderEvent = serde_json::from_slice(payload).map_err(|e| {
        NormalizeError::MalformedPayload(format!("{}: {}", header.kind, e))
    })?;

    match event {
        ProviderEvent::InvoicePaid { id, data } => Ok(invoice_to_event(id, data.object)),
        ProviderEvent::SubscriptionDeleted { id, data } => Ok(BillingEvent {
            kind: BillingEventKind::SubscriptionCanceled,
            provider_event_id: id,
            customer_email: None,
            customer_id: data.object.customer.map(Expandable::into_id),
            subscription_id: Some(data.object.id),
            period_end: None,
            amount_minor_units: None,
        }),
        ProviderEvent::Unrecognized => Err(NormalizeError::UnrecognizedEventType(header.kind)),
    }
}

fn invoice_to_event(event_id: String, invoice: InvoiceObject) -> BillingEvent {
    // Newer API versions nest the subscription under parent.subscription_details.
    let subscription_id = invoice
        .parent
        .and_then(|p| p.subscription_details)
        .and_then(|d| d.subscription)
        .or(invoice.subscription)
        .map(Expandable::into_id)
        .filter(|id| !id.is_empty());

    let period_end = invoice
        .lines
        .map(|lines| lines.data)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|line| line.period.and_then(|p| p.end))
        .filter_map(timestamp_to_datetime)
        .max();

    BillingEvent {
        kind: BillingEventKind::PaymentSucceeded,
        provider_event_id: event_id,
        customer_email: invoice
            .customer_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty()),
        customer_id: invoice.customer.map(Expandable::into_id),
        subscription_id,
        period_end,
        amount_minor_units: invoice.amount_paid,
    }
}

/// Provider timestamps are unix seconds; zero, negative or out-of-range
/// values are treated as absent.
pub fn timestamp_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

/// Builds a `Stripe-Signature` header value for `payload`.
#[cfg(test)]
pub(crate) fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
