use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::entitlement::UserEntitlement;

/// Premium state derived from a stored row at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PremiumState {
    Free,
    PremiumActive { expires_at: DateTime<Utc> },
    /// Paid but no period end recorded yet; expected to be short-lived.
    PremiumActiveNoExpiry,
}

/// The single entitlement predicate for feature gating.
pub fn is_entitled(entitlement: &UserEntitlement) -> bool {
    is_entitled_at(entitlement, Utc::now())
}

pub fn is_entitled_at(entitlement: &UserEntitlement, now: DateTime<Utc>) -> bool {
    entitlement.is_premium
        && entitlement
            .premium_expires_at
            .map_or(true, |expires_at| expires_at > now)
}

pub fn premium_state_at(entitlement: &UserEntitlement, now: DateTime<Utc>) -> PremiumState {
    if !is_entitled_at(entitlement, now) {
        return PremiumState::Free;
    }
    match entitlement.premium_expires_at {
        Some(expires_at) => PremiumState::PremiumActive { expires_at },
        None => PremiumState::PremiumActiveNoExpiry,
    }
}
