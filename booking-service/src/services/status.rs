//! Per-kind booking lifecycles.
//!
//! Every status write goes through [`transition`] or the payment helpers here,
//! so the tables below are the only definition of a legal move.

use crate::models::{
    Booking, BookingKind, BookingStatus, Cancellation, CancelledBy, PaymentStatus,
};
use crate::services::error::BookingError;
use chrono::{DateTime, Utc};

use BookingStatus::*;

const APPOINTMENT_EDGES: &[(BookingStatus, BookingStatus)] = &[
    (Pending, Confirmed),
    (Pending, Cancelled),
    (Confirmed, Completed),
    (Confirmed, Cancelled),
    (Confirmed, Rescheduled),
    (Rescheduled, Confirmed),
    (Rescheduled, Cancelled),
];

const PHARMACY_EDGES: &[(BookingStatus, BookingStatus)] = &[
    (Pending, Confirmed),
    (Confirmed, Processing),
    (Processing, OutForDelivery),
    (OutForDelivery, Delivered),
    (Pending, Cancelled),
    (Confirmed, Cancelled),
    (Processing, Cancelled),
    (OutForDelivery, Cancelled),
];

const AMBULANCE_EDGES: &[(BookingStatus, BookingStatus)] = &[
    (Pending, Confirmed),
    (Confirmed, Dispatched),
    (Dispatched, Arrived),
    (Arrived, InTransit),
    (InTransit, Completed),
    (Pending, Cancelled),
    (Confirmed, Cancelled),
];

const DONATION_EDGES: &[(BookingStatus, BookingStatus)] = &[
    (Pending, Completed),
    (Pending, Failed),
    (Completed, Refunded),
];

fn edges(kind: BookingKind) -> &'static [(BookingStatus, BookingStatus)] {
    match kind {
        BookingKind::Appointment => APPOINTMENT_EDGES,
        BookingKind::Pharmacy => PHARMACY_EDGES,
        BookingKind::Ambulance => AMBULANCE_EDGES,
        BookingKind::Donation => DONATION_EDGES,
    }
}

pub fn is_allowed(kind: BookingKind, from: BookingStatus, to: BookingStatus) -> bool {
    edges(kind).contains(&(from, to))
}

/// Statuses with no outgoing edge.
pub fn is_terminal(kind: BookingKind, status: BookingStatus) -> bool {
    !edges(kind).iter().any(|(from, _)| *from == status)
}

/// Whether `status` belongs to the lifecycle of `kind` at all.
pub fn is_known(kind: BookingKind, status: BookingStatus) -> bool {
    status == Pending || edges(kind).iter().any(|(_, to)| *to == status)
}

/// Status a booking moves to once its payment is captured.
pub fn post_payment_status(kind: BookingKind) -> BookingStatus {
    match kind {
        BookingKind::Donation => Completed,
        _ => Confirmed,
    }
}

/// Statuses that end a booking without its service being delivered.
pub fn is_closed(status: BookingStatus) -> bool {
    matches!(status, Cancelled | Failed | Refunded)
}

/// A booking accepts a new payment while it is unpaid and not closed. Bookings
/// an operator already moved along (confirmed, dispatched, ...) stay payable.
pub fn accepts_payment(booking: &Booking) -> bool {
    !booking.is_paid() && !is_closed(booking.status)
}

/// Cancellation details for a move into `cancelled`.
#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub cancelled_by: CancelledBy,
    pub reason: Option<String>,
}

/// Validates and applies `booking.status -> to` in memory.
///
/// The caller persists the result with a compare-and-set on the previous status.
pub fn transition(
    booking: &mut Booking,
    to: BookingStatus,
    cancel: Option<CancelRequest>,
    at: DateTime<Utc>,
) -> Result<(), BookingError> {
    let from = booking.status;

    if !is_allowed(booking.booking_type, from, to) {
        return Err(BookingError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    if booking.booking_type == BookingKind::Ambulance
        && to == Dispatched
        && !booking.is_emergency()
        && !booking.is_paid()
    {
        return Err(BookingError::invalid_state(
            "Payment must be completed before the ambulance can be dispatched",
        ));
    }

    if to == Cancelled {
        let cancel = cancel.ok_or_else(|| {
            BookingError::validation("cancel_reason", "cancel_reason is required")
        })?;
        let reason = cancel
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                BookingError::validation("cancel_reason", "cancel_reason is required")
            })?;
        booking.cancellation = Some(Cancellation {
            cancelled_by: cancel.cancelled_by,
            reason,
        });
    }

    if to == Refunded && booking.payment_status == PaymentStatus::Paid {
        booking.payment_status = PaymentStatus::Refunded;
    }

    booking.status = to;
    booking.timeline.mark(to, at);
    booking.updated_at = at;
    Ok(())
}

/// Outcome of applying a captured payment to a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentApplication {
    /// Linked and marked paid; a pending booking also moved to its
    /// post-payment status.
    Applied,
    /// Linked and marked paid but the status could not move (e.g. cancelled meanwhile).
    LinkedOnly,
}

/// Marks `booking` paid by `payment_id`. A pending booking moves to its
/// post-payment status; one already further along keeps its status and
/// milestones. Closed bookings are only linked.
pub fn apply_payment_success(
    booking: &mut Booking,
    payment_id: &str,
    at: DateTime<Utc>,
) -> PaymentApplication {
    booking.payment_id = Some(payment_id.to_string());
    booking.payment_status = PaymentStatus::Paid;
    booking.updated_at = at;

    if is_closed(booking.status) {
        return PaymentApplication::LinkedOnly;
    }

    let target = post_payment_status(booking.booking_type);
    if booking.status == Pending && is_allowed(booking.booking_type, Pending, target) {
        booking.status = target;
        booking.timeline.mark(target, at);
    }
    PaymentApplication::Applied
}

/// Records a failed payment attempt. Returns `false` when nothing changed.
pub fn apply_payment_failure(booking: &mut Booking, at: DateTime<Utc>) -> bool {
    if booking.is_paid() || booking.payment_status == PaymentStatus::Failed {
        return false;
    }

    booking.payment_status = PaymentStatus::Failed;
    if booking.booking_type == BookingKind::Donation
        && is_allowed(BookingKind::Donation, booking.status, Failed)
    {
        booking.status = Failed;
    }
    booking.updated_at = at;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AmbulanceDetails, AmbulanceType, BookingDetails, Campaign, DonationDetails,
        EmergencyContact, Location, PatientInfo,
    };

    fn ambulance(is_emergency: bool) -> Booking {
        let location = Location {
            address: "1 Main St".to_string(),
            latitude: None,
            longitude: None,
        };
        Booking::new(
            "patient-1".to_string(),
            "AMB202401010001".to_string(),
            1500.0,
            "INR".to_string(),
            BookingDetails::Ambulance(AmbulanceDetails {
                ambulance_type: AmbulanceType::Basic,
                pickup_address: location.clone(),
                drop_address: location,
                patient: PatientInfo {
                    name: "Asha".to_string(),
                    age: 60,
                    condition: None,
                },
                emergency_contact: EmergencyContact {
                    name: "Ravi".to_string(),
                    phone: "9999999999".to_string(),
                },
                is_emergency,
                base_fare: 1500.0,
                emergency_charge: 0.0,
                appointment_id: None,
            }),
        )
    }

    fn donation() -> Booking {
        Booking::new(
            "patient-1".to_string(),
            "DON202401010001".to_string(),
            100.0,
            "INR".to_string(),
            BookingDetails::Donation(DonationDetails {
                campaign: Campaign {
                    title: "Clinic".to_string(),
                    description: None,
                    target_amount: 1000.0,
                },
                is_anonymous: true,
                message: None,
            }),
        )
    }

    fn cancel(reason: &str) -> Option<CancelRequest> {
        Some(CancelRequest {
            cancelled_by: CancelledBy::Patient,
            reason: Some(reason.to_string()),
        })
    }

    #[test]
    fn test_transition_tables() {
        assert!(is_allowed(BookingKind::Appointment, Confirmed, Rescheduled));
        assert!(is_allowed(BookingKind::Appointment, Rescheduled, Confirmed));
        assert!(!is_allowed(BookingKind::Appointment, Pending, Completed));
        assert!(is_allowed(BookingKind::Pharmacy, OutForDelivery, Cancelled));
        assert!(!is_allowed(BookingKind::Pharmacy, Delivered, Cancelled));
        assert!(!is_allowed(BookingKind::Ambulance, Dispatched, Cancelled));
        assert!(is_allowed(BookingKind::Donation, Completed, Refunded));
        assert!(!is_allowed(BookingKind::Donation, Refunded, Completed));
    }

    #[test]
    fn test_terminal_statuses() {
        for kind in BookingKind::ALL {
            assert!(is_terminal(kind, Cancelled));
            assert!(!is_terminal(kind, Pending));
        }
        assert!(is_terminal(BookingKind::Appointment, Completed));
        assert!(is_terminal(BookingKind::Pharmacy, Delivered));
        assert!(is_terminal(BookingKind::Donation, Failed));
        assert!(is_terminal(BookingKind::Donation, Refunded));
    }

    #[test]
    fn test_cancel_requires_reason() {
        let mut booking = ambulance(false);

        let err = transition(&mut booking, Cancelled, None, Utc::now()).unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert_eq!(booking.status, Pending);

        let err = transition(&mut booking, Cancelled, cancel("   "), Utc::now()).unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));

        transition(&mut booking, Cancelled, cancel("changed plans"), Utc::now()).unwrap();
        assert_eq!(booking.status, Cancelled);
        assert!(booking.timeline.cancelled_at.is_some());
        let cancellation = booking.cancellation.unwrap();
        assert_eq!(cancellation.cancelled_by, CancelledBy::Patient);
        assert_eq!(cancellation.reason, "changed plans");
    }

    #[test]
    fn test_cancelling_cancelled_is_invalid() {
        let mut booking = ambulance(false);
        transition(&mut booking, Cancelled, cancel("first"), Utc::now()).unwrap();

        let err = transition(&mut booking, Cancelled, cancel("again"), Utc::now()).unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
        assert_eq!(booking.cancellation.unwrap().reason, "first");
    }

    #[test]
    fn test_unpaid_ambulance_cannot_dispatch() {
        let mut booking = ambulance(false);
        transition(&mut booking, Confirmed, None, Utc::now()).unwrap();

        let err = transition(&mut booking, Dispatched, None, Utc::now()).unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));
        assert_eq!(booking.status, Confirmed);
    }

    #[test]
    fn test_emergency_ambulance_bypasses_payment_gate() {
        let mut booking = ambulance(true);
        transition(&mut booking, Confirmed, None, Utc::now()).unwrap();
        transition(&mut booking, Dispatched, None, Utc::now()).unwrap();

        assert_eq!(booking.status, Dispatched);
        assert!(booking.timeline.dispatched_at.is_some());
    }

    #[test]
    fn test_payment_success_moves_to_post_payment_status() {
        let mut booking = donation();
        let outcome = apply_payment_success(&mut booking, "pay-1", Utc::now());

        assert_eq!(outcome, PaymentApplication::Applied);
        assert_eq!(booking.status, Completed);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.payment_id.as_deref(), Some("pay-1"));
        assert!(booking.timeline.completed_at.is_some());
    }

    #[test]
    fn test_payment_success_on_cancelled_booking_links_only() {
        let mut booking = ambulance(false);
        transition(&mut booking, Cancelled, cancel("no longer needed"), Utc::now()).unwrap();

        let outcome = apply_payment_success(&mut booking, "pay-1", Utc::now());
        assert_eq!(outcome, PaymentApplication::LinkedOnly);
        assert_eq!(booking.status, Cancelled);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_payment_failure_marks_donation_failed() {
        let mut booking = donation();
        assert!(apply_payment_failure(&mut booking, Utc::now()));
        assert_eq!(booking.status, Failed);
        assert_eq!(booking.payment_status, PaymentStatus::Failed);

        let mut paid = ambulance(false);
        apply_payment_success(&mut paid, "pay-1", Utc::now());
        assert!(!apply_payment_failure(&mut paid, Utc::now()));
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_accepts_payment() {
        let booking = ambulance(false);
        assert!(accepts_payment(&booking));

        let mut cancelled = ambulance(false);
        transition(&mut cancelled, Cancelled, cancel("x"), Utc::now()).unwrap();
        assert!(!accepts_payment(&cancelled));

        let mut paid = donation();
        apply_payment_success(&mut paid, "pay-1", Utc::now());
        assert!(!accepts_payment(&paid));

        let mut confirmed = ambulance(false);
        transition(&mut confirmed, Confirmed, None, Utc::now()).unwrap();
        assert!(accepts_payment(&confirmed));
    }

    #[test]
    fn test_payment_success_keeps_operator_progress() {
        let mut booking = ambulance(false);
        let confirmed_at = Utc::now() - chrono::Duration::minutes(5);
        transition(&mut booking, Confirmed, None, confirmed_at).unwrap();

        let outcome = apply_payment_success(&mut booking, "pay-1", Utc::now());
        assert_eq!(outcome, PaymentApplication::Applied);
        assert_eq!(booking.status, Confirmed);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.timeline.confirmed_at, Some(confirmed_at));

        transition(&mut booking, Dispatched, None, Utc::now()).unwrap();
        assert_eq!(booking.status, Dispatched);
    }

    #[test]
    fn test_payment_success_after_emergency_dispatch() {
        let mut booking = ambulance(true);
        transition(&mut booking, Confirmed, None, Utc::now()).unwrap();
        transition(&mut booking, Dispatched, None, Utc::now()).unwrap();

        let outcome = apply_payment_success(&mut booking, "pay-1", Utc::now());
        assert_eq!(outcome, PaymentApplication::Applied);
        assert_eq!(booking.status, Dispatched);
    }
}
