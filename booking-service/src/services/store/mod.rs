//! Persistence seam.
//!
//! [`MongoStore`] is the production backend; [`InMemoryStore`] backs tests and
//! local runs without a database. Both honour the same atomicity contract:
//! counters are atomic, status writes are compare-and-set and settlements are
//! all-or-nothing.

mod memory;
mod mongo;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

use crate::models::{
    Booking, BookingKind, BookingStatus, Doctor, Hospital, Medicine, Notification, Payment,
    TransactionStatus,
};
use crate::services::access::BookingScope;
use crate::services::error::BookingError;
use crate::services::settlement::SettlementWrite;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u64 = 10;
    pub const MAX_LIMIT: u64 = 100;

    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone)]
pub struct BookingQuery {
    pub scope: BookingScope,
    pub status: Option<BookingStatus>,
    pub page: PageRequest,
}

#[derive(Debug, Clone)]
pub struct PaymentQuery {
    /// `None` lists every user's payments (admin view).
    pub user_id: Option<String>,
    pub booking_type: Option<BookingKind>,
    pub status: Option<TransactionStatus>,
    pub page: PageRequest,
}

#[derive(Debug, Clone)]
pub struct NotificationQuery {
    pub user_id: String,
    pub unread_only: bool,
    pub page: PageRequest,
}

/// Result of applying a [`SettlementWrite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A guarded document changed since it was read; nothing was written.
    Conflict,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Atomically increments and returns the counter named `key`, starting at 1.
    async fn next_sequence(&self, key: &str) -> Result<u64, BookingError>;

    async fn insert_booking(&self, booking: &Booking) -> Result<(), BookingError>;

    async fn get_booking(
        &self,
        kind: BookingKind,
        id: &str,
    ) -> Result<Option<Booking>, BookingError>;

    /// Newest first, with the total count of matching bookings.
    async fn list_bookings(
        &self,
        kind: BookingKind,
        query: &BookingQuery,
    ) -> Result<(Vec<Booking>, u64), BookingError>;

    /// Replaces the booking only if its stored status is still `expected`.
    async fn replace_booking_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, BookingError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<(), BookingError>;

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, BookingError>;

    async fn find_payment_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, BookingError>;

    async fn list_payments(
        &self,
        query: &PaymentQuery,
    ) -> Result<(Vec<Payment>, u64), BookingError>;

    /// Writes the payment and optional booking together, or neither.
    async fn commit_settlement(
        &self,
        write: &SettlementWrite,
    ) -> Result<CommitOutcome, BookingError>;

    async fn find_doctor(&self, id: &str) -> Result<Option<Doctor>, BookingError>;

    async fn find_doctor_by_user_id(&self, user_id: &str) -> Result<Option<Doctor>, BookingError>;

    async fn find_hospital(&self, id: &str) -> Result<Option<Hospital>, BookingError>;

    async fn find_medicine(&self, id: &str) -> Result<Option<Medicine>, BookingError>;

    async fn insert_notification(&self, notification: &Notification) -> Result<(), BookingError>;

    async fn list_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<(Vec<Notification>, u64), BookingError>;

    /// Marks the user's notification read; `None` if it does not exist for that user.
    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Notification>, BookingError>;

    async fn health_check(&self) -> Result<(), BookingError>;
}
