//! Razorpay payment gateway.
//!
//! Orders API for payment initiation, checkout and webhook signature checks
//! for confirmation.

use super::{
    payment_signature_payload, verify_signature, GatewayError, GatewayOrder, PaymentGateway,
};
use crate::config::RazorpayConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Razorpay rejects receipts longer than this.
const MAX_RECEIPT_LEN: usize = 40;

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: RazorpayConfig,
}

/// Request to create a Razorpay order.
#[derive(Debug, Serialize)]
pub struct CreateOrderRequest<'a> {
    /// Amount in smallest currency unit (paise for INR).
    pub amount: u64,
    pub currency: &'a str,
    pub receipt: &'a str,
}

/// Response from Razorpay order creation.
#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub entity: String,
    pub amount: u64,
    #[serde(default)]
    pub amount_paid: u64,
    #[serde(default)]
    pub amount_due: u64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: u64,
}

impl From<RazorpayOrder> for GatewayOrder {
    fn from(order: RazorpayOrder) -> Self {
        GatewayOrder {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            status: order.status,
        }
    }
}

/// Razorpay API error response.
#[derive(Debug, Deserialize)]
pub struct RazorpayError {
    pub error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayErrorDetail {
    pub code: String,
    pub description: String,
    pub source: Option<String>,
    pub step: Option<String>,
    pub reason: Option<String>,
}

/// Razorpay webhook event.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub entity: String,
    pub account_id: Option<String>,
    pub event: String,
    #[serde(default)]
    pub contains: Vec<String>,
    pub payload: WebhookPayload,
    pub created_at: u64,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookPaymentEntity>,
    pub order: Option<WebhookOrderEntity>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    pub entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct WebhookOrderEntity {
    pub entity: RazorpayOrder,
}

/// Razorpay payment entity.
#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    pub status: String,
    pub order_id: Option<String>,
    pub method: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub captured: Option<bool>,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    pub fn payment(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }

    /// Gateway order id, from the order entity or the payment's `order_id`.
    pub fn order_id(&self) -> Option<&str> {
        self.payload
            .order
            .as_ref()
            .map(|o| o.entity.id.as_str())
            .or_else(|| self.payment().and_then(|p| p.order_id.as_deref()))
    }
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::NotConfigured(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Check if Razorpay is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    async fn create_order(
        &self,
        amount_minor: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured(
                "Razorpay credentials not configured".to_string(),
            ));
        }

        let receipt_end = receipt
            .char_indices()
            .nth(MAX_RECEIPT_LEN)
            .map_or(receipt.len(), |(i, _)| i);
        let request = CreateOrderRequest {
            amount: amount_minor,
            currency,
            receipt: &receipt[..receipt_end],
        };

        let url = format!("{}/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        tracing::debug!(status = %status, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(order.into())
        } else {
            let error: RazorpayError =
                serde_json::from_str(&body).unwrap_or_else(|_| RazorpayError {
                    error: RazorpayErrorDetail {
                        code: "UNKNOWN".to_string(),
                        description: body.clone(),
                        source: None,
                        step: None,
                        reason: None,
                    },
                });
            tracing::error!(
                code = %error.error.code,
                description = %error.error.description,
                reason = ?error.error.reason,
                "Razorpay order creation failed"
            );
            Err(GatewayError::Rejected {
                code: error.error.code,
                description: error.error.description,
            })
        }
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, GatewayError> {
        let is_valid = verify_signature(
            self.config.key_secret.expose_secret(),
            payment_signature_payload(order_id, payment_id).as_bytes(),
            signature,
        )?;

        if is_valid {
            tracing::info!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verified successfully"
            );
        } else {
            tracing::warn!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verification failed"
            );
        }

        Ok(is_valid)
    }

    fn verify_webhook_signature(
        &self,
        body: &[u8],
        signature: &str,
    ) -> Result<bool, GatewayError> {
        let is_valid =
            verify_signature(self.config.webhook_secret.expose_secret(), body, signature)?;

        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }

        Ok(is_valid)
    }
}
