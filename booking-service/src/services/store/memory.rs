use super::{
    BookingQuery, BookingStore, CommitOutcome, NotificationQuery, PageRequest, PaymentQuery,
};
use crate::models::{
    Booking, BookingKind, BookingStatus, Doctor, Hospital, Medicine, Notification, Payment,
};
use crate::services::error::BookingError;
use crate::services::settlement::SettlementWrite;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    counters: HashMap<String, u64>,
    bookings: HashMap<(BookingKind, String), Booking>,
    payments: HashMap<String, Payment>,
    doctors: HashMap<String, Doctor>,
    hospitals: HashMap<String, Hospital>,
    medicines: HashMap<String, Medicine>,
    notifications: HashMap<String, Notification>,
}

/// Process-local store. One lock guards everything, so every operation is atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

fn paginate<T>(mut items: Vec<T>, page: &PageRequest) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let skip = page.skip() as usize;
    let items = if skip >= items.len() {
        Vec::new()
    } else {
        items
            .drain(skip..)
            .take(page.limit as usize)
            .collect()
    };
    (items, total)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_doctor(&self, doctor: Doctor) {
        self.inner
            .lock()
            .await
            .doctors
            .insert(doctor.id.clone(), doctor);
    }

    pub async fn seed_hospital(&self, hospital: Hospital) {
        self.inner
            .lock()
            .await
            .hospitals
            .insert(hospital.id.clone(), hospital);
    }

    pub async fn seed_medicine(&self, medicine: Medicine) {
        self.inner
            .lock()
            .await
            .medicines
            .insert(medicine.id.clone(), medicine);
    }

    /// Drops a booking, simulating one that vanished before reconciliation.
    pub async fn remove_booking(&self, kind: BookingKind, id: &str) -> Option<Booking> {
        self.inner
            .lock()
            .await
            .bookings
            .remove(&(kind, id.to_string()))
    }

    pub async fn payment_count(&self) -> usize {
        self.inner.lock().await.payments.len()
    }

    pub async fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.inner
            .lock()
            .await
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn next_sequence(&self, key: &str) -> Result<u64, BookingError> {
        let mut inner = self.inner.lock().await;
        let counter = inner.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<(), BookingError> {
        let mut inner = self.inner.lock().await;
        if inner
            .bookings
            .values()
            .any(|b| b.reference_number == booking.reference_number)
        {
            return Err(BookingError::Internal(anyhow::anyhow!(
                "duplicate reference number {}",
                booking.reference_number
            )));
        }
        inner
            .bookings
            .insert((booking.booking_type, booking.id.clone()), booking.clone());
        Ok(())
    }

    async fn get_booking(
        &self,
        kind: BookingKind,
        id: &str,
    ) -> Result<Option<Booking>, BookingError> {
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .get(&(kind, id.to_string()))
            .cloned())
    }

    async fn list_bookings(
        &self,
        kind: BookingKind,
        query: &BookingQuery,
    ) -> Result<(Vec<Booking>, u64), BookingError> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.booking_type == kind)
            .filter(|b| query.scope.admits(b))
            .filter(|b| query.status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, &query.page))
    }

    async fn replace_booking_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError> {
        let mut inner = self.inner.lock().await;
        match inner
            .bookings
            .get_mut(&(booking.booking_type, booking.id.clone()))
        {
            Some(stored) if stored.status == expected => {
                *stored = booking.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), BookingError> {
        self.inner
            .lock()
            .await
            .payments
            .insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, BookingError> {
        Ok(self.inner.lock().await.payments.get(id).cloned())
    }

    async fn find_payment_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, BookingError> {
        Ok(self
            .inner
            .lock()
            .await
            .payments
            .values()
            .find(|p| p.gateway_order_id == gateway_order_id)
            .cloned())
    }

    async fn list_payments(
        &self,
        query: &PaymentQuery,
    ) -> Result<(Vec<Payment>, u64), BookingError> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| query.user_id.as_ref().map_or(true, |u| &p.user_id == u))
            .filter(|p| query.booking_type.map_or(true, |k| p.booking_type == k))
            .filter(|p| query.status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, &query.page))
    }

    async fn commit_settlement(
        &self,
        write: &SettlementWrite,
    ) -> Result<CommitOutcome, BookingError> {
        let mut inner = self.inner.lock().await;

        let payment_matches = inner
            .payments
            .get(&write.payment.id)
            .is_some_and(|p| p.status == write.expected_payment_status);
        if !payment_matches {
            return Ok(CommitOutcome::Conflict);
        }

        if let Some(booking_write) = &write.booking {
            let key = (
                booking_write.booking.booking_type,
                booking_write.booking.id.clone(),
            );
            let booking_matches = inner.bookings.get(&key).is_some_and(|b| {
                b.status == booking_write.expected_status
                    && b.payment_status == booking_write.expected_payment_status
            });
            if !booking_matches {
                return Ok(CommitOutcome::Conflict);
            }
        }

        // Same guarantee as the partial unique index on successful payments.
        if write.payment.is_success() {
            let clash = inner.payments.values().any(|p| {
                p.id != write.payment.id
                    && p.is_success()
                    && p.booking_type == write.payment.booking_type
                    && p.reference_id == write.payment.reference_id
            });
            if clash {
                return Ok(CommitOutcome::Conflict);
            }
        }

        inner
            .payments
            .insert(write.payment.id.clone(), write.payment.clone());
        if let Some(booking_write) = &write.booking {
            let booking = &booking_write.booking;
            inner
                .bookings
                .insert((booking.booking_type, booking.id.clone()), booking.clone());
        }
        Ok(CommitOutcome::Committed)
    }

    async fn find_doctor(&self, id: &str) -> Result<Option<Doctor>, BookingError> {
        Ok(self.inner.lock().await.doctors.get(id).cloned())
    }

    async fn find_doctor_by_user_id(&self, user_id: &str) -> Result<Option<Doctor>, BookingError> {
        Ok(self
            .inner
            .lock()
            .await
            .doctors
            .values()
            .find(|d| d.user_id == user_id)
            .cloned())
    }

    async fn find_hospital(&self, id: &str) -> Result<Option<Hospital>, BookingError> {
        Ok(self.inner.lock().await.hospitals.get(id).cloned())
    }

    async fn find_medicine(&self, id: &str) -> Result<Option<Medicine>, BookingError> {
        Ok(self.inner.lock().await.medicines.get(id).cloned())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), BookingError> {
        self.inner
            .lock()
            .await
            .notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<(Vec<Notification>, u64), BookingError> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.user_id == query.user_id)
            .filter(|n| !query.unread_only || !n.is_read)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, &query.page))
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Notification>, BookingError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .get_mut(id)
            .filter(|n| n.user_id == user_id)
            .map(|n| {
                n.mark_read();
                n.clone()
            }))
    }

    async fn health_check(&self) -> Result<(), BookingError> {
        Ok(())
    }
}
