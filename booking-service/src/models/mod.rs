pub mod booking;
pub mod notification;
pub mod payment;
pub mod reference;
pub(crate) mod serde_helpers;

pub use booking::{
    Address, AmbulanceDetails, AmbulanceType, AppointmentDetails, Booking, BookingDetails,
    BookingKind, BookingStatus, Campaign, Cancellation, CancelledBy, ConsultationType,
    EmergencyContact, Location, OrderItem, PatientInfo, PaymentStatus, PharmacyDetails,
    DonationDetails, Timeline,
};
pub use notification::{Notification, NotificationCategory};
pub use payment::{Payment, TransactionStatus};
pub use reference::{Doctor, Hospital, Medicine};
