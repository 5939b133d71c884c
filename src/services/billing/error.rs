use crate::services::stripe::StripeServiceError;

/// How a failure should be surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Authentication,
    NotFound,
    Conflict,
    Dependency,
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("invalid plan '{0}', expected one of monthly, quarterly, yearly")]
    InvalidPlan(String),
    #[error("invalid checkout session id")]
    InvalidSessionId,
    #[error("webhook signature verification failed")]
    Authentication,
    #[error("user not found")]
    UserNotFound,
    #[error("checkout session is not linked to a user")]
    SessionNotFound,
    #[error("subscription is already active")]
    AlreadyPremium,
    #[error("no active subscription")]
    NoActiveSubscription,
    #[error("billing provider error: {0}")]
    Provider(#[from] StripeServiceError),
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl BillingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BillingError::InvalidPlan(_) | BillingError::InvalidSessionId => ErrorClass::Validation,
            BillingError::Authentication => ErrorClass::Authentication,
            BillingError::UserNotFound | BillingError::SessionNotFound => ErrorClass::NotFound,
            BillingError::AlreadyPremium | BillingError::NoActiveSubscription => {
                ErrorClass::Conflict
            }
            BillingError::Provider(_) | BillingError::Persistence(_) => ErrorClass::Dependency,
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::InvalidPlan(_) => "INVALID_PLAN",
            BillingError::InvalidSessionId => "INVALID_SESSION_ID",
            BillingError::Authentication => "INVALID_SIGNATURE",
            BillingError::UserNotFound => "USER_NOT_FOUND",
            BillingError::SessionNotFound => "SESSION_NOT_FOUND",
            BillingError::AlreadyPremium => "ALREADY_PREMIUM",
            BillingError::NoActiveSubscription => "NO_ACTIVE_SUBSCRIPTION",
            BillingError::Provider(_) => "PROVIDER_UNAVAILABLE",
            BillingError::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
