use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed};
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub razorpay: RazorpayConfig,
    pub payments: PaymentsConfig,
    pub pricing: PricingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    pub currency: String,
    /// Upper bound on a gateway order call.
    pub gateway_timeout_secs: u64,
}

/// Fees in major currency units.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    pub pharmacy_delivery_charge: f64,
    pub ambulance_basic_fare: f64,
    pub ambulance_advanced_fare: f64,
    pub ambulance_cardiac_fare: f64,
    pub ambulance_emergency_charge: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            pharmacy_delivery_charge: 50.0,
            ambulance_basic_fare: 1500.0,
            ambulance_advanced_fare: 2500.0,
            ambulance_cardiac_fare: 3500.0,
            ambulance_emergency_charge: 500.0,
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            gateway_timeout_secs: 10,
        }
    }
}

impl BookingConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = common_config.is_prod();
        let pricing = PricingConfig::default();
        let payments = PaymentsConfig::default();

        Ok(BookingConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: Secret::new(get_env(
                    "MONGODB_URI",
                    Some("mongodb://localhost:27017/?replicaSet=rs0"),
                    is_prod,
                )?),
                database: get_env("MONGODB_DATABASE", Some("booking_db"), is_prod)?,
            },
            razorpay: RazorpayConfig {
                key_id: get_env("RAZORPAY_KEY_ID", Some(""), is_prod)?,
                key_secret: Secret::new(get_env("RAZORPAY_KEY_SECRET", Some(""), is_prod)?),
                webhook_secret: Secret::new(get_env(
                    "RAZORPAY_WEBHOOK_SECRET",
                    Some(""),
                    is_prod,
                )?),
                api_base_url: get_env(
                    "RAZORPAY_API_BASE_URL",
                    Some("https://api.razorpay.com/v1"),
                    false,
                )?,
            },
            payments: PaymentsConfig {
                currency: get_env("PAYMENT_CURRENCY", Some(&payments.currency), false)?,
                gateway_timeout_secs: get_env_parsed(
                    "GATEWAY_TIMEOUT_SECS",
                    payments.gateway_timeout_secs,
                    false,
                )?,
            },
            pricing: PricingConfig {
                pharmacy_delivery_charge: get_env_parsed(
                    "PHARMACY_DELIVERY_CHARGE",
                    pricing.pharmacy_delivery_charge,
                    false,
                )?,
                ambulance_basic_fare: get_env_parsed(
                    "AMBULANCE_BASIC_FARE",
                    pricing.ambulance_basic_fare,
                    false,
                )?,
                ambulance_advanced_fare: get_env_parsed(
                    "AMBULANCE_ADVANCED_FARE",
                    pricing.ambulance_advanced_fare,
                    false,
                )?,
                ambulance_cardiac_fare: get_env_parsed(
                    "AMBULANCE_CARDIAC_FARE",
                    pricing.ambulance_cardiac_fare,
                    false,
                )?,
                ambulance_emergency_charge: get_env_parsed(
                    "AMBULANCE_EMERGENCY_CHARGE",
                    pricing.ambulance_emergency_charge,
                    false,
                )?,
            },
        })
    }
}
