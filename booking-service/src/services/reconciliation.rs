//! Payment reconciliation.
//!
//! Creates gateway orders against bookings and settles them from either the
//! checkout callback or the gateway webhook. Settlement re-reads state and
//! commits through [`BookingStore::commit_settlement`], so concurrent or
//! replayed confirmations converge on a single outcome.

use crate::models::{Booking, BookingKind, BookingStatus, Payment, TransactionStatus};
use crate::services::access::{AccessGuard, Identity};
use crate::services::error::BookingError;
use crate::services::gateway::razorpay::WebhookEvent;
use crate::services::gateway::{GatewayOrder, PaymentGateway};
use crate::services::metrics;
use crate::services::notifications::NotificationService;
use crate::services::numbering::PAYMENT_FORMAT;
use crate::services::settlement::{plan_failure, plan_settlement, SettlementPlan};
use crate::services::status;
use crate::services::store::{BookingStore, CommitOutcome, PageRequest, PaymentQuery};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Optimistic settlement attempts before giving up on a contended payment.
const MAX_SETTLE_ATTEMPTS: usize = 5;

/// Tolerance when comparing a client-supplied amount with the booking amount.
const AMOUNT_EPSILON: f64 = 0.005;

pub const DEFAULT_FAILURE_REASON: &str = "payment failed";

/// A freshly created gateway order and its pending payment.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub payment: Payment,
    pub order: GatewayOrder,
    pub key_id: String,
}

#[derive(Debug, Clone)]
pub struct Verification {
    pub payment: Payment,
    pub booking: Booking,
    /// The payment was already settled before this call.
    pub replayed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Replayed,
    Ignored,
    Failed,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Replayed => "replayed",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookAck {
    pub event: String,
    pub status: WebhookOutcome,
}

impl WebhookAck {
    fn new(event: impl Into<String>, status: WebhookOutcome) -> Self {
        Self {
            event: event.into(),
            status,
        }
    }
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationService,
    gateway_timeout: Duration,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationService,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            notifications,
            gateway_timeout,
        }
    }

    /// Opens a gateway order for a booking and records a pending payment.
    ///
    /// Nothing is written unless the gateway accepted the order. The booking
    /// itself is not touched.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn create_payment_order(
        &self,
        identity: &Identity,
        kind: BookingKind,
        booking_id: &str,
        amount: Option<f64>,
    ) -> Result<PaymentOrder, BookingError> {
        let booking = self
            .store
            .get_booking(kind, booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Booking"))?;

        AccessGuard::ensure_can_pay(identity, &booking)?;

        if booking.is_paid() {
            return Err(BookingError::invalid_state("Booking is already paid"));
        }
        if !status::accepts_payment(&booking) {
            return Err(BookingError::invalid_state(format!(
                "Booking cannot be paid while {}",
                booking.status
            )));
        }
        if let Some(amount) = amount {
            if !amount.is_finite() || (amount - booking.amount).abs() > AMOUNT_EPSILON {
                return Err(BookingError::invalid_state(
                    "Payment amount does not match the booking amount",
                ));
            }
        }

        let amount_minor = (booking.amount * 100.0).round() as u64;
        if amount_minor == 0 {
            return Err(BookingError::invalid_state(
                "Booking amount must be greater than zero",
            ));
        }

        let receipt = format!("{}_{}", kind, booking.reference_number);
        let started = Instant::now();
        let order = match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway
                .create_order(amount_minor, &booking.currency, &receipt),
        )
        .await
        {
            Ok(Ok(order)) => {
                metrics::record_gateway_order("success", started.elapsed());
                order
            }
            Ok(Err(e)) => {
                metrics::record_gateway_order("error", started.elapsed());
                tracing::error!(error = %e, booking_id = %booking.id, "Gateway order creation failed");
                return Err(BookingError::UpstreamFailure(e.to_string()));
            }
            Err(_) => {
                metrics::record_gateway_order("timeout", started.elapsed());
                tracing::error!(
                    booking_id = %booking.id,
                    timeout_secs = self.gateway_timeout.as_secs_f64(),
                    "Gateway order creation timed out"
                );
                return Err(BookingError::UpstreamFailure(format!(
                    "gateway did not respond within {:?}",
                    self.gateway_timeout
                )));
            }
        };

        let today = Utc::now().date_naive();
        let sequence = self
            .store
            .next_sequence(&PAYMENT_FORMAT.counter_key(today))
            .await?;
        let payment = Payment::new(
            PAYMENT_FORMAT.render(today, sequence),
            booking.owner_id.clone(),
            kind,
            booking.id.clone(),
            booking.amount,
            booking.currency.clone(),
            order.id.clone(),
        );
        self.store.insert_payment(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            gateway_order_id = %order.id,
            amount_minor,
            "Payment order created"
        );

        Ok(PaymentOrder {
            payment,
            order,
            key_id: self.gateway.key_id().to_string(),
        })
    }

    /// Verifies the checkout signature and settles the payment.
    #[tracing::instrument(skip(self, signature))]
    pub async fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<Verification, BookingError> {
        let valid = self
            .gateway
            .verify_payment_signature(gateway_order_id, gateway_payment_id, signature)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Signature check errored");
                false
            });
        if !valid {
            metrics::record_reconciliation("signature_mismatch");
            return Err(BookingError::SignatureMismatch);
        }

        self.settle(gateway_order_id, gateway_payment_id, Some(signature))
            .await
    }

    /// Marks the payment for `gateway_order_id` captured and fans the result
    /// out to its booking. Safe to call repeatedly and concurrently.
    pub async fn settle(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: Option<&str>,
    ) -> Result<Verification, BookingError> {
        for attempt in 1..=MAX_SETTLE_ATTEMPTS {
            let payment = self
                .store
                .find_payment_by_gateway_order(gateway_order_id)
                .await?
                .ok_or_else(|| BookingError::not_found("Payment"))?;
            let booking = self
                .store
                .get_booking(payment.booking_type, &payment.reference_id)
                .await?;

            let plan = plan_settlement(
                &payment,
                booking.as_ref(),
                gateway_payment_id,
                signature,
                Utc::now(),
            );
            let write = match &plan {
                SettlementPlan::AlreadySettled => {
                    return self.replayed(payment, booking, gateway_payment_id)
                }
                SettlementPlan::Settle(write)
                | SettlementPlan::LinkOnly(write)
                | SettlementPlan::BookingMissing(write)
                | SettlementPlan::Duplicate { write, .. } => write,
            };

            match self.store.commit_settlement(write).await? {
                CommitOutcome::Committed => return self.settled(plan).await,
                CommitOutcome::Conflict => {
                    tracing::debug!(attempt, gateway_order_id, "Settlement conflict, retrying");
                }
            }
        }

        Err(BookingError::Internal(anyhow::anyhow!(
            "settlement of {} did not converge after {} attempts",
            gateway_order_id,
            MAX_SETTLE_ATTEMPTS
        )))
    }

    fn replayed(
        &self,
        payment: Payment,
        booking: Option<Booking>,
        gateway_payment_id: &str,
    ) -> Result<Verification, BookingError> {
        if payment.gateway_payment_id.as_deref() != Some(gateway_payment_id) {
            tracing::warn!(
                payment_id = %payment.id,
                captured = ?payment.gateway_payment_id,
                incoming = gateway_payment_id,
                "Second capture for an already settled order"
            );
            metrics::record_reconciliation("duplicate");
            return Err(BookingError::DuplicatePayment {
                booking_id: payment.reference_id,
                existing_payment_id: payment.id,
            });
        }

        let Some(booking) = booking else {
            return Err(BookingError::PartialReconciliation {
                payment_id: payment.id,
                booking_id: payment.reference_id,
                reason: "booking not found".to_string(),
            });
        };

        if let Some(reason) = unreconciled_reason(&payment, &booking) {
            metrics::record_reconciliation("partial");
            tracing::warn!(
                payment_id = %payment.id,
                booking_id = %booking.id,
                reason = %reason,
                "Replayed payment is still not reflected on its booking"
            );
            return Err(BookingError::PartialReconciliation {
                payment_id: payment.id,
                booking_id: booking.id,
                reason,
            });
        }

        metrics::record_reconciliation("replayed");
        tracing::info!(payment_id = %payment.id, "Payment already settled");
        Ok(Verification {
            payment,
            booking,
            replayed: true,
        })
    }

    async fn settled(&self, plan: SettlementPlan) -> Result<Verification, BookingError> {
        match plan {
            SettlementPlan::Settle(write) => {
                let payment = write.payment;
                let Some(booking) = write.booking.map(|b| b.booking) else {
                    return Err(BookingError::Internal(anyhow::anyhow!(
                        "settled payment {} has no booking write",
                        payment.id
                    )));
                };

                tracing::info!(
                    payment_id = %payment.id,
                    booking_id = %booking.id,
                    booking_status = %booking.status,
                    "Payment reconciled"
                );
                metrics::record_reconciliation("settled");
                metrics::record_amount(&payment.currency, (payment.amount * 100.0).round() as u64);
                self.notifications.payment_confirmed(&booking, &payment).await;

                Ok(Verification {
                    payment,
                    booking,
                    replayed: false,
                })
            }
            SettlementPlan::LinkOnly(write) => {
                let (booking_id, reason) = match &write.booking {
                    Some(b) => (
                        b.booking.id.clone(),
                        format!("booking is {}", b.booking.status),
                    ),
                    None => (write.payment.reference_id.clone(), "booking not updated".to_string()),
                };
                tracing::warn!(
                    payment_id = %write.payment.id,
                    booking_id = %booking_id,
                    reason = %reason,
                    "Payment captured but booking status left unchanged"
                );
                metrics::record_reconciliation("partial");
                Err(BookingError::PartialReconciliation {
                    payment_id: write.payment.id,
                    booking_id,
                    reason,
                })
            }
            SettlementPlan::BookingMissing(write) => {
                tracing::error!(
                    payment_id = %write.payment.id,
                    booking_id = %write.payment.reference_id,
                    "Payment captured for a missing booking"
                );
                metrics::record_reconciliation("partial");
                Err(BookingError::PartialReconciliation {
                    payment_id: write.payment.id,
                    booking_id: write.payment.reference_id,
                    reason: "booking not found".to_string(),
                })
            }
            SettlementPlan::Duplicate {
                write,
                existing_payment_id,
            } => {
                tracing::warn!(
                    payment_id = %write.payment.id,
                    existing_payment_id = %existing_payment_id,
                    "Duplicate payment recorded as failed, refund required"
                );
                metrics::record_reconciliation("duplicate");
                Err(BookingError::DuplicatePayment {
                    booking_id: write.payment.reference_id,
                    existing_payment_id,
                })
            }
            SettlementPlan::AlreadySettled => Err(BookingError::Internal(anyhow::anyhow!(
                "already settled plan has nothing to commit"
            ))),
        }
    }

    /// Records a failed attempt. Returns `None` when the payment had already
    /// reached a final state and nothing changed.
    pub async fn record_failure(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: Option<&str>,
        reason: &str,
    ) -> Result<Option<Payment>, BookingError> {
        for attempt in 1..=MAX_SETTLE_ATTEMPTS {
            let payment = self
                .store
                .find_payment_by_gateway_order(gateway_order_id)
                .await?
                .ok_or_else(|| BookingError::not_found("Payment"))?;
            let booking = self
                .store
                .get_booking(payment.booking_type, &payment.reference_id)
                .await?;

            let Some(write) = plan_failure(
                &payment,
                booking.as_ref(),
                gateway_payment_id,
                reason,
                Utc::now(),
            ) else {
                tracing::info!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    "Ignoring failure for a settled payment"
                );
                return Ok(None);
            };

            match self.store.commit_settlement(&write).await? {
                CommitOutcome::Committed => {
                    tracing::warn!(payment_id = %write.payment.id, reason, "Payment failed");
                    metrics::record_reconciliation("failed");
                    self.notifications.payment_failed(&write.payment).await;
                    return Ok(Some(write.payment));
                }
                CommitOutcome::Conflict => {
                    tracing::debug!(attempt, gateway_order_id, "Failure record conflict, retrying");
                }
            }
        }

        Err(BookingError::Internal(anyhow::anyhow!(
            "failure of {} did not converge after {} attempts",
            gateway_order_id,
            MAX_SETTLE_ATTEMPTS
        )))
    }

    /// Handles a signed gateway webhook. Once the signature checks out, the
    /// event is always acknowledged; processing problems are logged.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, BookingError> {
        let signature = signature.ok_or(BookingError::SignatureMismatch)?;
        let valid = self
            .gateway
            .verify_webhook_signature(body, signature)
            .unwrap_or(false);
        if !valid {
            metrics::record_reconciliation("signature_mismatch");
            return Err(BookingError::SignatureMismatch);
        }

        let event = match WebhookEvent::parse(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable webhook payload");
                return Ok(WebhookAck::new("unknown", WebhookOutcome::Ignored));
            }
        };

        tracing::info!(event = %event.event, "Webhook received");

        let outcome = match event.event.as_str() {
            "payment.captured" | "order.paid" => self.on_captured(&event).await,
            "payment.failed" => self.on_failed(&event).await,
            other => {
                tracing::debug!(event = other, "Unhandled webhook event");
                WebhookOutcome::Ignored
            }
        };

        Ok(WebhookAck::new(event.event, outcome))
    }

    async fn on_captured(&self, event: &WebhookEvent) -> WebhookOutcome {
        let (Some(order_id), Some(payment)) = (event.order_id(), event.payment()) else {
            tracing::warn!(event = %event.event, "Capture event without order or payment");
            return WebhookOutcome::Ignored;
        };

        match self.settle(order_id, &payment.id, None).await {
            Ok(v) if v.replayed => WebhookOutcome::Replayed,
            Ok(_) => WebhookOutcome::Processed,
            Err(e) => {
                tracing::error!(error = %e, order_id, "Webhook settlement failed");
                WebhookOutcome::Failed
            }
        }
    }

    async fn on_failed(&self, event: &WebhookEvent) -> WebhookOutcome {
        let Some(order_id) = event.order_id() else {
            tracing::warn!("Failure event without order id");
            return WebhookOutcome::Ignored;
        };
        let payment = event.payment();
        let reason = payment
            .and_then(|p| p.error_description.as_deref())
            .unwrap_or(DEFAULT_FAILURE_REASON);

        match self
            .record_failure(order_id, payment.map(|p| p.id.as_str()), reason)
            .await
        {
            Ok(Some(_)) => WebhookOutcome::Processed,
            Ok(None) => WebhookOutcome::Ignored,
            Err(e) => {
                tracing::error!(error = %e, order_id, "Webhook failure handling failed");
                WebhookOutcome::Failed
            }
        }
    }

    pub async fn get_payment(
        &self,
        identity: &Identity,
        id: &str,
    ) -> Result<Payment, BookingError> {
        let payment = self
            .store
            .get_payment(id)
            .await?
            .ok_or_else(|| BookingError::not_found("Payment"))?;
        AccessGuard::ensure_can_view_payment(identity, &payment)?;
        Ok(payment)
    }

    /// Caller's payments, newest first. Admins see everyone's.
    pub async fn list_payments(
        &self,
        identity: &Identity,
        booking_type: Option<BookingKind>,
        status: Option<TransactionStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Payment>, u64), BookingError> {
        let query = PaymentQuery {
            user_id: (!identity.is_admin()).then(|| identity.user_id.clone()),
            booking_type,
            status,
            page,
        };
        self.store.list_payments(&query).await
    }
}

/// Why a settled payment is not reflected on its booking, if it isn't: the
/// booking points at another payment, or it was closed before the capture.
/// Closing it after the capture is ordinary lifecycle.
fn unreconciled_reason(payment: &Payment, booking: &Booking) -> Option<String> {
    if booking.payment_id.as_deref() != Some(payment.id.as_str()) {
        return Some("booking is linked to another payment".to_string());
    }
    if !status::is_closed(booking.status) {
        return None;
    }

    let closed_at = match booking.status {
        BookingStatus::Cancelled => booking.timeline.cancelled_at,
        BookingStatus::Refunded => booking.timeline.refunded_at,
        _ => None,
    };
    match (closed_at, payment.verified_at) {
        (Some(closed), Some(captured)) if closed > captured => None,
        _ => Some(format!("booking is {}", booking.status)),
    }
}
