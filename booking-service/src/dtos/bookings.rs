use crate::models::{
    AmbulanceType, Booking, BookingDetails, BookingKind, BookingStatus, Cancellation,
    ConsultationType, PaymentStatus, Timeline,
};
use crate::services::error::{field_errors, BookingError, FieldError};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    #[validate(length(min = 1, message = "doctor_id is required"))]
    pub doctor_id: String,
    pub hospital_id: Option<String>,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`, 24-hour clock
    pub time: String,
    #[serde(default = "default_consultation_type")]
    pub consultation_type: ConsultationType,
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    /// Overrides the doctor's consultation fee.
    pub fee: Option<f64>,
}

fn default_consultation_type() -> ConsultationType {
    ConsultationType::Clinic
}

impl CreateAppointmentRequest {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT).ok()
    }

    fn check(&self, today: NaiveDate, errors: &mut Vec<FieldError>) {
        match self.parsed_date() {
            None => errors.push(FieldError::new("date", "date must be in YYYY-MM-DD format")),
            Some(date) if date < today => {
                errors.push(FieldError::new("date", "date cannot be in the past"))
            }
            Some(_) => {}
        }
        if NaiveTime::parse_from_str(&self.time, TIME_FORMAT).is_err() {
            errors.push(FieldError::new("time", "time must be in HH:MM format"));
        }
        if let Some(fee) = self.fee {
            if !fee.is_finite() || fee < 0.0 {
                errors.push(FieldError::new("fee", "fee must be a non-negative amount"));
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderItemRequest {
    #[validate(length(min = 1, message = "medicine_id is required"))]
    pub medicine_id: String,
    #[validate(range(min = 1, max = 100, message = "quantity must be between 1 and 100"))]
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 3, max = 10, message = "zip_code must be 3 to 10 characters"))]
    pub zip_code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePharmacyOrderRequest {
    #[validate(nested)]
    pub items: Vec<OrderItemRequest>,
    #[validate(nested)]
    pub delivery_address: AddressRequest,
    #[validate(url(message = "prescription_url must be a valid URL"))]
    pub prescription_url: Option<String>,
}

impl CreatePharmacyOrderRequest {
    fn check(&self, errors: &mut Vec<FieldError>) {
        if self.items.is_empty() {
            errors.push(FieldError::new("items", "at least one item is required"));
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocationRequest {
    #[validate(length(min = 1, message = "address is required"))]
    pub address: String,
    #[validate(range(min = -90.0, max = 90.0, message = "latitude out of range"))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "longitude out of range"))]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PatientRequest {
    #[validate(length(min = 1, message = "patient name is required"))]
    pub name: String,
    #[validate(range(max = 150, message = "age must be at most 150"))]
    pub age: u32,
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EmergencyContactRequest {
    #[validate(length(min = 1, message = "emergency contact name is required"))]
    pub name: String,
    #[validate(length(min = 7, max = 20, message = "phone must be 7 to 20 characters"))]
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAmbulanceRequest {
    pub ambulance_type: AmbulanceType,
    #[validate(nested)]
    pub pickup_address: LocationRequest,
    #[validate(nested)]
    pub drop_address: LocationRequest,
    #[validate(nested)]
    pub patient: PatientRequest,
    #[validate(nested)]
    pub emergency_contact: EmergencyContactRequest,
    #[serde(default)]
    pub is_emergency: bool,
    pub appointment_id: Option<String>,
}

impl CreateAmbulanceRequest {
    fn check(&self, errors: &mut Vec<FieldError>) {
        let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-');
        if !self.emergency_contact.phone.chars().all(allowed) {
            errors.push(FieldError::new(
                "emergency_contact.phone",
                "phone may only contain digits, spaces, '+' and '-'",
            ));
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CampaignRequest {
    #[validate(length(min = 1, max = 200, message = "campaign title is required"))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = 1.0, message = "target_amount must be at least 1"))]
    pub target_amount: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDonationRequest {
    #[validate(nested)]
    pub campaign: CampaignRequest,
    #[validate(range(min = 1.0, message = "amount must be at least 1"))]
    pub amount: f64,
    #[serde(default)]
    pub is_anonymous: bool,
    #[validate(length(max = 500, message = "message must be at most 500 characters"))]
    pub message: Option<String>,
}

impl CreateDonationRequest {
    fn check(&self, errors: &mut Vec<FieldError>) {
        if !self.amount.is_finite() {
            errors.push(FieldError::new("amount", "amount must be a finite number"));
        }
    }
}

/// Create payload, chosen by the `{type}` path segment.
#[derive(Debug, Clone)]
pub enum CreateBookingRequest {
    Appointment(CreateAppointmentRequest),
    Pharmacy(CreatePharmacyOrderRequest),
    Ambulance(CreateAmbulanceRequest),
    Donation(CreateDonationRequest),
}

impl CreateBookingRequest {
    /// Deserializes the body for `kind`. Shape errors become a `body` field error.
    pub fn from_json(kind: BookingKind, body: serde_json::Value) -> Result<Self, BookingError> {
        let parsed = match kind {
            BookingKind::Appointment => serde_json::from_value(body).map(Self::Appointment),
            BookingKind::Pharmacy => serde_json::from_value(body).map(Self::Pharmacy),
            BookingKind::Ambulance => serde_json::from_value(body).map(Self::Ambulance),
            BookingKind::Donation => serde_json::from_value(body).map(Self::Donation),
        };
        parsed.map_err(|e| BookingError::validation("body", e.to_string()))
    }

    pub fn kind(&self) -> BookingKind {
        match self {
            Self::Appointment(_) => BookingKind::Appointment,
            Self::Pharmacy(_) => BookingKind::Pharmacy,
            Self::Ambulance(_) => BookingKind::Ambulance,
            Self::Donation(_) => BookingKind::Donation,
        }
    }

    /// Runs the derived field rules and the per-type checks, reporting every failure.
    pub fn validate_request(&self, today: NaiveDate) -> Result<(), BookingError> {
        let derived = match self {
            Self::Appointment(r) => r.validate(),
            Self::Pharmacy(r) => r.validate(),
            Self::Ambulance(r) => r.validate(),
            Self::Donation(r) => r.validate(),
        };
        let mut errors = derived.err().map(|e| field_errors(&e)).unwrap_or_default();

        match self {
            Self::Appointment(r) => r.check(today, &mut errors),
            Self::Pharmacy(r) => r.check(&mut errors),
            Self::Ambulance(r) => r.check(&mut errors),
            Self::Donation(r) => r.check(&mut errors),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            errors.sort_by(|a, b| a.field.cmp(&b.field));
            Err(BookingError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelBookingRequest {
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingListParams {
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrived_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<String>,
}

fn rfc3339(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339())
}

impl From<Timeline> for TimelineResponse {
    fn from(t: Timeline) -> Self {
        Self {
            confirmed_at: rfc3339(t.confirmed_at),
            dispatched_at: rfc3339(t.dispatched_at),
            arrived_at: rfc3339(t.arrived_at),
            delivered_at: rfc3339(t.delivered_at),
            completed_at: rfc3339(t.completed_at),
            cancelled_at: rfc3339(t.cancelled_at),
            refunded_at: rfc3339(t.refunded_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub reference_number: String,
    pub booking_type: BookingKind,
    pub owner_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    pub timeline: TimelineResponse,
    pub details: BookingDetails,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            reference_number: b.reference_number,
            booking_type: b.booking_type,
            owner_id: b.owner_id,
            amount: b.amount,
            currency: b.currency,
            status: b.status,
            payment_id: b.payment_id,
            payment_status: b.payment_status,
            cancellation: b.cancellation,
            timeline: b.timeline.into(),
            details: b.details,
            created_at: b.created_at.to_rfc3339(),
            updated_at: b.updated_at.to_rfc3339(),
        }
    }
}
