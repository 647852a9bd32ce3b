//! Runtime configuration.
//!
//! Loaded with the `config` crate from `config/default.toml`, an optional
//! `config/{env}.toml` overlay and `HOUSING__*` environment variables
//! (e.g. `HOUSING__PAYMENTS__SECRET_KEY`). Every field has a default, so an
//! empty environment loads a usable development setup.

use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};
use crate::lifecycle::PaymentPolicy;
use crate::pricing::PricingPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub bookings: BookingsConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Marketplace REST API used for property lookup and notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Unset means the in-memory collaborators are used
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingsConfig {
    #[serde(default)]
    pub pricing: PricingPolicy,
    #[serde(default)]
    pub payment_policy: PaymentPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default)]
    pub secret_key: String,
    /// Where the gateway sends the payer back; `booking_id` is appended
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Upper bound for any single gateway call
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_ms: u64,
    /// Hand out the outstanding checkout again instead of superseding it
    #[serde(default = "default_true")]
    pub reuse_pending_attempt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_ms: u64,
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl AppConfig {
    /// Load configuration for the given environment name
    pub fn load(env: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("HOUSING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| BookingError::Config(format!("failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| BookingError::Config(format!("failed to deserialize config: {e}")))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_ms: default_api_timeout(),
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            secret_key: String::new(),
            callback_url: default_callback_url(),
            currency: default_currency(),
            gateway_timeout_ms: default_gateway_timeout(),
            reuse_pending_attempt: true,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: default_dispatch_interval(),
            max_delivery_attempts: default_max_delivery_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_api_timeout() -> u64 {
    10_000
}

fn default_gateway_url() -> String {
    "https://api.lahza.io".to_string()
}

fn default_callback_url() -> String {
    "http://localhost:8080/payment-success".to_string()
}

fn default_currency() -> String {
    "ILS".to_string()
}

fn default_gateway_timeout() -> u64 {
    15_000
}

fn default_true() -> bool {
    true
}

fn default_dispatch_interval() -> u64 {
    500
}

fn default_max_delivery_attempts() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}
