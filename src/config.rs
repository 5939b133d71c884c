use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::models::plan::Plan;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_WEBHOOK_TOLERANCE_SECONDS: i64 = 300;
const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_PREMIUM_SWEEP_INTERVAL_SECONDS: u64 = 3600;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Maximum age of a signed webhook timestamp, in seconds.
    pub webhook_tolerance_seconds: i64,
    /// Upper bound on every outbound provider call made from a request.
    pub request_timeout: Duration,
}

/// Provider price ids for each purchasable plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceCatalog {
    pub monthly: String,
    pub quarterly: String,
    pub yearly: String,
}

impl PriceCatalog {
    pub fn price_id(&self, plan: Plan) -> &str {
        match plan {
            Plan::Monthly => &self.monthly,
            Plan::Quarterly => &self.quarterly,
            Plan::Yearly => &self.yearly,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub stripe: StripeSettings,
    pub prices: PriceCatalog,
    /// `None` disables the in-process expired-premium sweep.
    pub premium_sweep_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let database_url = require("DATABASE_URL")?;
        let frontend_origin = require("FRONTEND_ORIGIN")?
            .trim_end_matches('/')
            .to_string();

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let secret_key = lookup("STRIPE_SECRET_KEY")
            .or_else(|| lookup("STRIPE_SECRET"))
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("STRIPE_SECRET_KEY"))?;

        let stripe = StripeSettings {
            secret_key,
            webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            webhook_tolerance_seconds: parse_or(
                &lookup,
                "STRIPE_WEBHOOK_TOLERANCE_SECONDS",
                DEFAULT_WEBHOOK_TOLERANCE_SECONDS,
            )?,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PROVIDER_TIMEOUT_SECONDS",
                DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            )?),
        };

        let prices = PriceCatalog {
            monthly: require("PRICE_MONTH")?,
            quarterly: require("PRICE_QUARTER")?,
            yearly: require("PRICE_YEAR")?,
        };

        let sweep_seconds: u64 = parse_or(
            &lookup,
            "PREMIUM_SWEEP_INTERVAL_SECONDS",
            DEFAULT_PREMIUM_SWEEP_INTERVAL_SECONDS,
        )?;
        let premium_sweep_interval = (sweep_seconds > 0).then(|| Duration::from_secs(sweep_seconds));

        Ok(Config {
            database_url,
            frontend_origin,
            bind_addr,
            stripe,
            prices,
            premium_sweep_interval,
        })
    }

    pub fn checkout_success_url(&self) -> String {
        format!("{}/#/success", self.frontend_origin)
    }

    pub fn checkout_cancel_url(&self) -> String {
        format!("{}/#/cancel", self.frontend_origin)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}
