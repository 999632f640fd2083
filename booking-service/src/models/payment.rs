use super::booking::BookingKind;
use super::serde_helpers::opt_chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Processing => write!(f, "processing"),
            TransactionStatus::Success => write!(f, "success"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// One gateway payment attempt against a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    /// Internal reference number (`PAY` + date + sequence).
    pub order_id: String,
    pub user_id: String,
    pub booking_type: BookingKind,
    /// Id of the booking this payment settles.
    pub reference_id: String,
    pub amount: f64,
    pub currency: String,
    pub gateway_order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_signature: Option<String>,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub verified_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        order_id: String,
        user_id: String,
        booking_type: BookingKind,
        reference_id: String,
        amount: f64,
        currency: String,
        gateway_order_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_id,
            user_id,
            booking_type,
            reference_id,
            amount,
            currency,
            gateway_order_id,
            gateway_payment_id: None,
            gateway_signature: None,
            status: TransactionStatus::Pending,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            verified_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    pub fn mark_success(
        &mut self,
        gateway_payment_id: String,
        gateway_signature: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = TransactionStatus::Success;
        self.gateway_payment_id = Some(gateway_payment_id);
        if gateway_signature.is_some() {
            self.gateway_signature = gateway_signature;
        }
        self.failure_reason = None;
        self.verified_at = Some(at);
        self.updated_at = at;
    }

    pub fn mark_failed(
        &mut self,
        gateway_payment_id: Option<String>,
        reason: String,
        at: DateTime<Utc>,
    ) {
        self.status = TransactionStatus::Failed;
        if gateway_payment_id.is_some() {
            self.gateway_payment_id = gateway_payment_id;
        }
        self.failure_reason = Some(reason);
        self.updated_at = at;
    }
}
