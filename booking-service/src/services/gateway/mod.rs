pub mod razorpay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service_core::utils::signature::{hmac_sha256_hex, verify_hmac_sha256_hex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

pub use razorpay::RazorpayGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Gateway rejected request: {code} - {description}")]
    Rejected { code: String, description: String },

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("Signature error: {0}")]
    Signature(String),
}

/// Order handle returned by the gateway, handed to the client for checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub id: String,
    /// Amount in the smallest currency unit (paise for INR).
    pub amount: u64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key the client uses to open checkout.
    fn key_id(&self) -> &str;

    async fn create_order(
        &self,
        amount_minor: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError>;

    /// Checks `HMAC-SHA256(order_id + "|" + payment_id)` keyed by the API secret.
    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, GatewayError>;

    /// Checks `HMAC-SHA256(raw_body)` keyed by the webhook secret.
    fn verify_webhook_signature(&self, body: &[u8], signature: &str)
        -> Result<bool, GatewayError>;
}

pub(crate) fn payment_signature_payload(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

pub(crate) fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature: &str,
) -> Result<bool, GatewayError> {
    verify_hmac_sha256_hex(secret.as_bytes(), payload, signature)
        .map_err(|e| GatewayError::Signature(e.to_string()))
}

/// Mock gateway for tests and local runs without Razorpay credentials.
///
/// Signs exactly like Razorpay, so callbacks can be produced with [`MockGateway::sign_payment`].
pub struct MockGateway {
    key_secret: String,
    webhook_secret: String,
    order_count: AtomicU64,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl MockGateway {
    pub fn new(key_secret: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            key_secret: key_secret.into(),
            webhook_secret: webhook_secret.into(),
            order_count: AtomicU64::new(0),
            failing: AtomicBool::new(false),
            delay: None,
        }
    }

    /// Makes `create_order` sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> u64 {
        self.order_count.load(Ordering::SeqCst)
    }

    pub fn sign_payment(&self, order_id: &str, payment_id: &str) -> String {
        hmac_sha256_hex(
            self.key_secret.as_bytes(),
            payment_signature_payload(order_id, payment_id).as_bytes(),
        )
        .unwrap_or_default()
    }

    pub fn sign_webhook(&self, body: &[u8]) -> String {
        hmac_sha256_hex(self.webhook_secret.as_bytes(), body).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn key_id(&self) -> &str {
        "rzp_mock_key"
    }

    async fn create_order(
        &self,
        amount_minor: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Request(
                "Mock gateway is unavailable".to_string(),
            ));
        }

        let n = self.order_count.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            amount = amount_minor,
            currency = %currency,
            receipt = %receipt,
            "[MOCK] Gateway order would be created"
        );

        Ok(GatewayOrder {
            id: format!("order_mock_{}", n),
            amount: amount_minor,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: "created".to_string(),
        })
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, GatewayError> {
        verify_signature(
            &self.key_secret,
            payment_signature_payload(order_id, payment_id).as_bytes(),
            signature,
        )
    }

    fn verify_webhook_signature(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<bool, GatewayError> {
        verify_signature(&self.webhook_secret, body, signature)
    }
}
