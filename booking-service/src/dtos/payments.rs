use crate::models::{BookingKind, BookingStatus, Payment, PaymentStatus, TransactionStatus};
use crate::services::reconciliation::{PaymentOrder, Verification, WebhookAck};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentOrderRequest {
    pub booking_type: String,
    #[validate(length(min = 1, message = "booking_id is required"))]
    pub booking_id: String,
    /// Major currency units; must match the booking amount when given.
    pub amount: Option<f64>,
}

/// Checkout callback fields, as posted by the Razorpay client.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentListParams {
    #[serde(rename = "type")]
    pub booking_type: Option<String>,
    pub status: Option<TransactionStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Payment as exposed over HTTP. The gateway signature is never returned.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub user_id: String,
    pub booking_type: BookingKind,
    pub reference_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub verified_at: Option<String>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            order_id: p.order_id,
            user_id: p.user_id,
            booking_type: p.booking_type,
            reference_id: p.reference_id,
            amount: p.amount,
            currency: p.currency,
            status: p.status,
            razorpay_order_id: p.gateway_order_id,
            razorpay_payment_id: p.gateway_payment_id,
            failure_reason: p.failure_reason,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
            verified_at: p.verified_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Everything the client needs to open checkout.
#[derive(Debug, Serialize)]
pub struct PaymentOrderResponse {
    pub payment: PaymentResponse,
    pub razorpay_order_id: String,
    /// Smallest currency unit.
    pub amount: u64,
    pub currency: String,
    pub razorpay_key_id: String,
}

impl From<PaymentOrder> for PaymentOrderResponse {
    fn from(o: PaymentOrder) -> Self {
        Self {
            payment: o.payment.into(),
            razorpay_order_id: o.order.id,
            amount: o.order.amount,
            currency: o.order.currency,
            razorpay_key_id: o.key_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub payment: PaymentResponse,
    pub booking_id: String,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    /// True when the payment had already been verified.
    pub replayed: bool,
}

impl From<Verification> for VerifyPaymentResponse {
    fn from(v: Verification) -> Self {
        Self {
            booking_id: v.booking.id,
            booking_status: v.booking.status,
            payment_status: v.booking.payment_status,
            payment: v.payment.into(),
            replayed: v.replayed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAckResponse {
    pub event: String,
    pub status: &'static str,
}

impl From<WebhookAck> for WebhookAckResponse {
    fn from(ack: WebhookAck) -> Self {
        Self {
            event: ack.event,
            status: ack.status.as_str(),
        }
    }
}
