pub mod access;
pub mod bookings;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod notifications;
pub mod numbering;
pub mod reconciliation;
pub mod settlement;
pub mod status;
pub mod store;

pub use access::{AccessGuard, Identity, Role};
pub use bookings::BookingService;
pub use error::BookingError;
pub use gateway::{MockGateway, PaymentGateway, RazorpayGateway};
pub use metrics::{get_metrics, init_metrics};
pub use notifications::NotificationService;
pub use reconciliation::ReconciliationEngine;
pub use store::{BookingStore, InMemoryStore, MongoStore};
