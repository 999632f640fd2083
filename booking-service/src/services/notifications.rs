use crate::models::{Booking, Notification, NotificationCategory, Payment};
use crate::services::access::Identity;
use crate::services::error::BookingError;
use crate::services::store::{BookingStore, NotificationQuery, PageRequest};
use std::sync::Arc;

/// In-app notifications for booking and payment events.
///
/// Recording is best effort: a failed insert is logged and never fails the
/// operation that triggered it.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn BookingStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    async fn record(&self, notification: Notification) {
        if let Err(e) = self.store.insert_notification(&notification).await {
            tracing::warn!(
                user_id = %notification.user_id,
                title = %notification.title,
                error = %e,
                "Failed to record notification"
            );
        }
    }

    pub async fn booking_created(&self, booking: &Booking) {
        self.record(Notification::new(
            booking.owner_id.clone(),
            "Booking created",
            format!(
                "Your {} booking {} has been created and is awaiting payment.",
                booking.booking_type, booking.reference_number
            ),
            booking.booking_type.into(),
            Some(booking.id.clone()),
        ))
        .await;
    }

    pub async fn payment_confirmed(&self, booking: &Booking, payment: &Payment) {
        self.record(Notification::new(
            booking.owner_id.clone(),
            "Payment successful",
            format!(
                "Payment {} of {:.2} {} for booking {} was successful.",
                payment.order_id, payment.amount, payment.currency, booking.reference_number
            ),
            NotificationCategory::Payment,
            Some(booking.id.clone()),
        ))
        .await;
    }

    pub async fn payment_failed(&self, payment: &Payment) {
        self.record(Notification::new(
            payment.user_id.clone(),
            "Payment failed",
            format!(
                "Payment {} could not be completed: {}.",
                payment.order_id,
                payment.failure_reason.as_deref().unwrap_or("unknown reason")
            ),
            NotificationCategory::Payment,
            Some(payment.reference_id.clone()),
        ))
        .await;
    }

    pub async fn booking_cancelled(&self, booking: &Booking) {
        let reason = booking
            .cancellation
            .as_ref()
            .map(|c| c.reason.as_str())
            .unwrap_or("no reason given");
        self.record(Notification::new(
            booking.owner_id.clone(),
            "Booking cancelled",
            format!(
                "Your {} booking {} was cancelled: {}.",
                booking.booking_type, booking.reference_number, reason
            ),
            booking.booking_type.into(),
            Some(booking.id.clone()),
        ))
        .await;
    }

    pub async fn list(
        &self,
        identity: &Identity,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<(Vec<Notification>, u64), BookingError> {
        self.store
            .list_notifications(&NotificationQuery {
                user_id: identity.user_id.clone(),
                unread_only,
                page,
            })
            .await
    }

    pub async fn mark_read(
        &self,
        identity: &Identity,
        id: &str,
    ) -> Result<Notification, BookingError> {
        self.store
            .mark_notification_read(&identity.user_id, id)
            .await?
            .ok_or_else(|| BookingError::not_found("Notification"))
    }
}
