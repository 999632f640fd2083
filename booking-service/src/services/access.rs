//! Centralised role checks.
//!
//! Handlers never compare roles themselves; every visibility or mutation
//! decision goes through [`AccessGuard`].

use crate::models::{Booking, BookingKind, CancelledBy, Payment};
use crate::services::error::BookingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl FromStr for Role {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            other => Err(BookingError::Forbidden(format!("Unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Doctor => write!(f, "doctor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// The authenticated caller, as asserted by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Which bookings a list query may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingScope {
    All,
    Owner(String),
    /// Own bookings plus appointments with the given doctor profile.
    OwnerOrDoctor { owner_id: String, doctor_id: String },
}

impl BookingScope {
    pub fn admits(&self, booking: &Booking) -> bool {
        match self {
            BookingScope::All => true,
            BookingScope::Owner(owner_id) => &booking.owner_id == owner_id,
            BookingScope::OwnerOrDoctor {
                owner_id,
                doctor_id,
            } => &booking.owner_id == owner_id || booking.doctor_id() == Some(doctor_id.as_str()),
        }
    }
}

/// Stateless capability decisions.
///
/// `doctor_profile` is the id of the Doctor record linked to the caller, when
/// the caller is a doctor with a profile.
pub struct AccessGuard;

impl AccessGuard {
    pub fn list_scope(identity: &Identity, doctor_profile: Option<&str>) -> BookingScope {
        match (identity.role, doctor_profile) {
            (Role::Admin, _) => BookingScope::All,
            (Role::Doctor, Some(doctor_id)) => BookingScope::OwnerOrDoctor {
                owner_id: identity.user_id.clone(),
                doctor_id: doctor_id.to_string(),
            },
            _ => BookingScope::Owner(identity.user_id.clone()),
        }
    }

    pub fn ensure_can_view(
        identity: &Identity,
        booking: &Booking,
        doctor_profile: Option<&str>,
    ) -> Result<(), BookingError> {
        if Self::list_scope(identity, doctor_profile).admits(booking) {
            Ok(())
        } else {
            Err(BookingError::Forbidden(
                "Not authorized to access this booking".to_string(),
            ))
        }
    }

    /// Only the owner (or an admin) may start a payment for a booking.
    pub fn ensure_can_pay(identity: &Identity, booking: &Booking) -> Result<(), BookingError> {
        if identity.is_admin() || booking.owner_id == identity.user_id {
            Ok(())
        } else {
            Err(BookingError::Forbidden(
                "Not authorized to pay for this booking".to_string(),
            ))
        }
    }

    pub fn ensure_can_cancel(
        identity: &Identity,
        booking: &Booking,
        doctor_profile: Option<&str>,
    ) -> Result<(), BookingError> {
        if Self::is_treating_doctor(identity, booking, doctor_profile)
            || identity.is_admin()
            || booking.owner_id == identity.user_id
        {
            Ok(())
        } else {
            Err(BookingError::Forbidden(
                "Not authorized to cancel this booking".to_string(),
            ))
        }
    }

    /// Operational status changes: admins on anything, doctors on their own appointments.
    pub fn ensure_can_update_status(
        identity: &Identity,
        booking: &Booking,
        doctor_profile: Option<&str>,
    ) -> Result<(), BookingError> {
        if identity.is_admin() || Self::is_treating_doctor(identity, booking, doctor_profile) {
            Ok(())
        } else {
            Err(BookingError::Forbidden(
                "Not authorized to update this booking".to_string(),
            ))
        }
    }

    pub fn ensure_can_view_payment(
        identity: &Identity,
        payment: &Payment,
    ) -> Result<(), BookingError> {
        if identity.is_admin() || payment.user_id == identity.user_id {
            Ok(())
        } else {
            Err(BookingError::Forbidden(
                "Not authorized to access this payment".to_string(),
            ))
        }
    }

    pub fn cancelled_by(identity: &Identity) -> CancelledBy {
        match identity.role {
            Role::Patient => CancelledBy::Patient,
            Role::Doctor => CancelledBy::Doctor,
            Role::Admin => CancelledBy::Admin,
        }
    }

    fn is_treating_doctor(
        identity: &Identity,
        booking: &Booking,
        doctor_profile: Option<&str>,
    ) -> bool {
        identity.role == Role::Doctor
            && booking.booking_type == BookingKind::Appointment
            && doctor_profile.is_some()
            && booking.doctor_id() == doctor_profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentDetails, BookingDetails, ConsultationType};
    use chrono::NaiveDate;

    fn appointment(owner: &str, doctor_id: &str) -> Booking {
        Booking::new(
            owner.to_string(),
            "APT000001".to_string(),
            500.0,
            "INR".to_string(),
            BookingDetails::Appointment(AppointmentDetails {
                doctor_id: doctor_id.to_string(),
                hospital_id: None,
                date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
                time: "10:30".to_string(),
                consultation_type: ConsultationType::Clinic,
                reason: None,
                symptoms: vec![],
                notes: None,
            }),
        )
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Patient".parse::<Role>().unwrap(), Role::Patient);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!(matches!(
            "superuser".parse::<Role>(),
            Err(BookingError::Forbidden(_))
        ));
    }

    #[test]
    fn test_patient_sees_only_own_bookings() {
        let booking = appointment("patient-1", "doc-1");
        let owner = Identity::new("patient-1", Role::Patient);
        let stranger = Identity::new("patient-2", Role::Patient);

        assert!(AccessGuard::ensure_can_view(&owner, &booking, None).is_ok());
        assert!(matches!(
            AccessGuard::ensure_can_view(&stranger, &booking, None),
            Err(BookingError::Forbidden(_))
        ));
    }

    #[test]
    fn test_doctor_sees_own_appointments() {
        let booking = appointment("patient-1", "doc-1");
        let doctor = Identity::new("doctor-user-1", Role::Doctor);

        assert!(AccessGuard::ensure_can_view(&doctor, &booking, Some("doc-1")).is_ok());
        assert!(AccessGuard::ensure_can_view(&doctor, &booking, Some("doc-2")).is_err());
        assert!(AccessGuard::ensure_can_view(&doctor, &booking, None).is_err());
        assert!(AccessGuard::ensure_can_update_status(&doctor, &booking, Some("doc-1")).is_ok());
    }

    #[test]
    fn test_only_owner_or_admin_can_pay() {
        let booking = appointment("patient-1", "doc-1");

        assert!(AccessGuard::ensure_can_pay(&Identity::new("patient-1", Role::Patient), &booking).is_ok());
        assert!(AccessGuard::ensure_can_pay(&Identity::new("admin-1", Role::Admin), &booking).is_ok());
        assert!(
            AccessGuard::ensure_can_pay(&Identity::new("doctor-user-1", Role::Doctor), &booking)
                .is_err()
        );
    }

    #[test]
    fn test_patient_cannot_update_status() {
        let booking = appointment("patient-1", "doc-1");
        let owner = Identity::new("patient-1", Role::Patient);

        assert!(AccessGuard::ensure_can_update_status(&owner, &booking, None).is_err());
        assert!(AccessGuard::ensure_can_cancel(&owner, &booking, None).is_ok());
    }

    #[test]
    fn test_list_scope_by_role() {
        assert_eq!(
            AccessGuard::list_scope(&Identity::new("a", Role::Admin), None),
            BookingScope::All
        );
        assert_eq!(
            AccessGuard::list_scope(&Identity::new("p", Role::Patient), Some("doc-1")),
            BookingScope::Owner("p".to_string())
        );
        assert_eq!(
            AccessGuard::list_scope(&Identity::new("d", Role::Doctor), Some("doc-1")),
            BookingScope::OwnerOrDoctor {
                owner_id: "d".to_string(),
                doctor_id: "doc-1".to_string()
            }
        );
    }
}
