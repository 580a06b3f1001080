use crate::application::engine::EngineConfig;
use crate::application::reconciliation::ReconciliationPolicy;
use crate::domain::money::Currency;
use crate::error::{OrderError, Result};
use crate::infrastructure::razorpay::{DEFAULT_BASE_URL, RazorpayConfig};
use clap::{Args, ValueEnum};
use std::time::Duration;

const SIMULATED_KEY_ID: &str = "rzp_test_simulated";
const SIMULATED_KEY_SECRET: &str = "simulated_secret";
/// One year.
const MAX_PENDING_TIMEOUT_MINS: u64 = 60 * 24 * 365;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum GatewayKind {
    /// In-process gateway; payments are scripted by `pay` events.
    #[default]
    Simulated,
    /// Live Razorpay REST API.
    Razorpay,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Runtime settings, read from flags or the environment.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// ISO 4217 currency carts are priced in
    #[arg(long, env = "ORDERFLOW_CURRENCY", default_value = "INR")]
    pub currency: Currency,

    /// Merchant label shown in the payment widget
    #[arg(long, env = "ORDERFLOW_MERCHANT_NAME", default_value = "SportX")]
    pub merchant_name: String,

    /// Upper bound on each payment gateway call, in seconds
    #[arg(long, env = "ORDERFLOW_GATEWAY_TIMEOUT_SECS", default_value_t = 10)]
    pub gateway_timeout_secs: u64,

    /// Age in minutes after which a pending order is reconciled
    #[arg(
        long,
        env = "ORDERFLOW_PENDING_TIMEOUT_MINS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(0..=MAX_PENDING_TIMEOUT_MINS)
    )]
    pub pending_timeout_mins: u64,

    /// Seconds between background reconciliation sweeps
    #[arg(
        long,
        env = "ORDERFLOW_SWEEP_INTERVAL_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "ORDERFLOW_GATEWAY", value_enum, default_value_t = GatewayKind::Simulated)]
    pub gateway: GatewayKind,

    #[arg(long, env = "RAZORPAY_KEY_ID", default_value = SIMULATED_KEY_ID)]
    pub key_id: String,

    #[arg(
        long,
        env = "RAZORPAY_KEY_SECRET",
        default_value = SIMULATED_KEY_SECRET,
        hide_env_values = true,
        hide_default_value = true
    )]
    pub key_secret: String,

    #[arg(long, env = "RAZORPAY_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub razorpay_base_url: String,

    #[arg(long, env = "ORDERFLOW_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Settings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            currency: self.currency,
            merchant_name: self.merchant_name.clone(),
            gateway_timeout: Duration::from_secs(self.gateway_timeout_secs),
        }
    }

    pub fn reconciliation_policy(&self) -> ReconciliationPolicy {
        ReconciliationPolicy {
            pending_timeout: Duration::from_secs(self.pending_timeout_mins.saturating_mul(60)),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }

    /// Live credentials are mandatory; the simulated defaults are refused.
    pub fn razorpay_config(&self) -> Result<RazorpayConfig> {
        if self.key_id == SIMULATED_KEY_ID || self.key_secret == SIMULATED_KEY_SECRET {
            return Err(OrderError::ValidationError(
                "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be set for the razorpay gateway"
                    .to_string(),
            ));
        }
        Ok(RazorpayConfig {
            key_id: self.key_id.clone(),
            key_secret: self.key_secret.clone(),
            base_url: self.razorpay_base_url.clone(),
        })
    }
}
