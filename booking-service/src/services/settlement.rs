//! Pure planning of payment outcomes.
//!
//! Given the current payment and booking, decide which documents change and
//! what the caller should be told. The store applies a plan atomically, guarded
//! by the `expected_*` states captured here.

use crate::models::{Booking, BookingStatus, Payment, PaymentStatus, TransactionStatus};
use crate::services::status::{self, PaymentApplication};
use chrono::{DateTime, Utc};

pub const DUPLICATE_PAYMENT_REASON: &str = "duplicate payment";

/// New booking state plus the state it must still be in when written.
#[derive(Debug, Clone)]
pub struct BookingWrite {
    pub booking: Booking,
    pub expected_status: BookingStatus,
    pub expected_payment_status: PaymentStatus,
}

/// Documents to write in one transaction.
#[derive(Debug, Clone)]
pub struct SettlementWrite {
    pub payment: Payment,
    pub expected_payment_status: TransactionStatus,
    pub booking: Option<BookingWrite>,
}

#[derive(Debug, Clone)]
pub enum SettlementPlan {
    /// The payment is already `success`; nothing to write.
    AlreadySettled,
    /// Payment success and booking paid, moved to its post-payment status.
    Settle(SettlementWrite),
    /// Payment success and booking linked, but the booking status could not move.
    LinkOnly(SettlementWrite),
    /// The booking is gone; the payment is still recorded as captured.
    BookingMissing(SettlementWrite),
    /// Another payment already settled the booking; this one is recorded as failed.
    Duplicate {
        write: SettlementWrite,
        existing_payment_id: String,
    },
}

pub fn plan_settlement(
    payment: &Payment,
    booking: Option<&Booking>,
    gateway_payment_id: &str,
    gateway_signature: Option<&str>,
    at: DateTime<Utc>,
) -> SettlementPlan {
    if payment.is_success() {
        return SettlementPlan::AlreadySettled;
    }

    let mut settled = payment.clone();

    let Some(booking) = booking else {
        settled.mark_success(
            gateway_payment_id.to_string(),
            gateway_signature.map(str::to_string),
            at,
        );
        return SettlementPlan::BookingMissing(SettlementWrite {
            payment: settled,
            expected_payment_status: payment.status,
            booking: None,
        });
    };

    if booking.is_paid() {
        if let Some(existing) = booking.payment_id.as_ref().filter(|id| **id != payment.id) {
            settled.mark_failed(
                Some(gateway_payment_id.to_string()),
                DUPLICATE_PAYMENT_REASON.to_string(),
                at,
            );
            return SettlementPlan::Duplicate {
                write: SettlementWrite {
                    payment: settled,
                    expected_payment_status: payment.status,
                    booking: None,
                },
                existing_payment_id: existing.clone(),
            };
        }
    }

    settled.mark_success(
        gateway_payment_id.to_string(),
        gateway_signature.map(str::to_string),
        at,
    );

    let mut updated = booking.clone();
    let application = status::apply_payment_success(&mut updated, &payment.id, at);
    let write = SettlementWrite {
        payment: settled,
        expected_payment_status: payment.status,
        booking: Some(BookingWrite {
            booking: updated,
            expected_status: booking.status,
            expected_payment_status: booking.payment_status,
        }),
    };

    match application {
        PaymentApplication::Applied => SettlementPlan::Settle(write),
        PaymentApplication::LinkedOnly => SettlementPlan::LinkOnly(write),
    }
}

/// `None` when the failure changes nothing (payment already settled or failed).
pub fn plan_failure(
    payment: &Payment,
    booking: Option<&Booking>,
    gateway_payment_id: Option<&str>,
    reason: &str,
    at: DateTime<Utc>,
) -> Option<SettlementWrite> {
    if matches!(
        payment.status,
        TransactionStatus::Success | TransactionStatus::Failed | TransactionStatus::Refunded
    ) {
        return None;
    }

    let mut failed = payment.clone();
    failed.mark_failed(gateway_payment_id.map(str::to_string), reason.to_string(), at);

    let booking_write = booking.and_then(|booking| {
        let mut updated = booking.clone();
        status::apply_payment_failure(&mut updated, at).then(|| BookingWrite {
            booking: updated,
            expected_status: booking.status,
            expected_payment_status: booking.payment_status,
        })
    });

    Some(SettlementWrite {
        payment: failed,
        expected_payment_status: payment.status,
        booking: booking_write,
    })
}
