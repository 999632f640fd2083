use super::serde_helpers::opt_chrono_datetime_as_bson_datetime;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The four bookable services. Each kind lives in its own collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    Appointment,
    Pharmacy,
    Ambulance,
    Donation,
}

#[derive(Debug, Error)]
#[error("invalid booking type: {0}")]
pub struct UnknownBookingKind(pub String);

impl BookingKind {
    pub const ALL: [BookingKind; 4] = [
        BookingKind::Appointment,
        BookingKind::Pharmacy,
        BookingKind::Ambulance,
        BookingKind::Donation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingKind::Appointment => "appointment",
            BookingKind::Pharmacy => "pharmacy",
            BookingKind::Ambulance => "ambulance",
            BookingKind::Donation => "donation",
        }
    }

    pub fn collection(&self) -> &'static str {
        match self {
            BookingKind::Appointment => "appointments",
            BookingKind::Pharmacy => "pharmacy_orders",
            BookingKind::Ambulance => "ambulance_bookings",
            BookingKind::Donation => "donations",
        }
    }

    /// Prefix of the human-readable reference number.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            BookingKind::Appointment => "APT",
            BookingKind::Pharmacy => "MED",
            BookingKind::Ambulance => "AMB",
            BookingKind::Donation => "DON",
        }
    }
}

impl fmt::Display for BookingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingKind {
    type Err = UnknownBookingKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appointment" => Ok(BookingKind::Appointment),
            "pharmacy" => Ok(BookingKind::Pharmacy),
            "ambulance" => Ok(BookingKind::Ambulance),
            "donation" => Ok(BookingKind::Donation),
            other => Err(UnknownBookingKind(other.to_string())),
        }
    }
}

/// Union of every per-kind lifecycle status. Which ones a kind may use is
/// decided by the transition tables in `services::status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Processing,
    OutForDelivery,
    Delivered,
    Dispatched,
    Arrived,
    InTransit,
    Completed,
    Cancelled,
    Failed,
    Refunded,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 13] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Rescheduled,
        BookingStatus::Processing,
        BookingStatus::OutForDelivery,
        BookingStatus::Delivered,
        BookingStatus::Dispatched,
        BookingStatus::Arrived,
        BookingStatus::InTransit,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Failed,
        BookingStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rescheduled => "rescheduled",
            BookingStatus::Processing => "processing",
            BookingStatus::OutForDelivery => "out_for_delivery",
            BookingStatus::Delivered => "delivered",
            BookingStatus::Dispatched => "dispatched",
            BookingStatus::Arrived => "arrived",
            BookingStatus::InTransit => "in_transit",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Failed => "failed",
            BookingStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownBookingStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownBookingStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown booking status: {0}")]
pub struct UnknownBookingStatus(pub String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Patient,
    Doctor,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cancellation {
    pub cancelled_by: CancelledBy,
    pub reason: String,
}

/// Milestone timestamps, each set when the booking enters the matching status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub arrived_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Timeline {
    /// Stamps the milestone belonging to `status`, if it has one.
    pub fn mark(&mut self, status: BookingStatus, at: DateTime<Utc>) {
        let slot = match status {
            BookingStatus::Confirmed => &mut self.confirmed_at,
            BookingStatus::Dispatched => &mut self.dispatched_at,
            BookingStatus::Arrived => &mut self.arrived_at,
            BookingStatus::Delivered => &mut self.delivered_at,
            BookingStatus::Completed => &mut self.completed_at,
            BookingStatus::Cancelled => &mut self.cancelled_at,
            BookingStatus::Refunded => &mut self.refunded_at,
            _ => return,
        };
        *slot = Some(at);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsultationType {
    Video,
    Clinic,
    Home,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentDetails {
    pub doctor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_id: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    pub consultation_type: ConsultationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub medicine_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PharmacyDetails {
    pub items: Vec<OrderItem>,
    pub delivery_address: Address,
    pub delivery_charge: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AmbulanceType {
    Basic,
    Advanced,
    Cardiac,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientInfo {
    pub name: String,
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmbulanceDetails {
    pub ambulance_type: AmbulanceType,
    pub pickup_address: Location,
    pub drop_address: Location,
    pub patient: PatientInfo,
    pub emergency_contact: EmergencyContact,
    pub is_emergency: bool,
    pub base_fare: f64,
    pub emergency_charge: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub target_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DonationDetails {
    pub campaign: Campaign,
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BookingDetails {
    Appointment(AppointmentDetails),
    Pharmacy(PharmacyDetails),
    Ambulance(AmbulanceDetails),
    Donation(DonationDetails),
}

impl BookingDetails {
    pub fn kind(&self) -> BookingKind {
        match self {
            BookingDetails::Appointment(_) => BookingKind::Appointment,
            BookingDetails::Pharmacy(_) => BookingKind::Pharmacy,
            BookingDetails::Ambulance(_) => BookingKind::Ambulance,
            BookingDetails::Donation(_) => BookingKind::Donation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: String,
    pub reference_number: String,
    pub booking_type: BookingKind,
    pub owner_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    #[serde(default)]
    pub timeline: Timeline,
    pub details: BookingDetails,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        owner_id: String,
        reference_number: String,
        amount: f64,
        currency: String,
        details: BookingDetails,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reference_number,
            booking_type: details.kind(),
            owner_id,
            amount,
            currency,
            status: BookingStatus::Pending,
            payment_id: None,
            payment_status: PaymentStatus::Pending,
            cancellation: None,
            timeline: Timeline::default(),
            details,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// The doctor an appointment is booked with.
    pub fn doctor_id(&self) -> Option<&str> {
        match &self.details {
            BookingDetails::Appointment(details) => Some(details.doctor_id.as_str()),
            _ => None,
        }
    }

    /// Emergency ambulance bookings skip the payment gate on dispatch.
    pub fn is_emergency(&self) -> bool {
        matches!(&self.details, BookingDetails::Ambulance(details) if details.is_emergency)
    }
}
