use crate::config::PricingConfig;
use crate::dtos::bookings::{
    CreateAmbulanceRequest, CreateAppointmentRequest, CreateBookingRequest,
    CreateDonationRequest, CreatePharmacyOrderRequest, LocationRequest,
};
use crate::models::{
    Address, AmbulanceDetails, AmbulanceType, AppointmentDetails, Booking, BookingDetails,
    BookingKind, BookingStatus, Campaign, DonationDetails, EmergencyContact, Location, OrderItem,
    PatientInfo, PharmacyDetails,
};
use crate::services::access::{AccessGuard, Identity, Role};
use crate::services::error::BookingError;
use crate::services::metrics;
use crate::services::notifications::NotificationService;
use crate::services::numbering::ReferenceFormat;
use crate::services::status::{self, CancelRequest};
use crate::services::store::{BookingQuery, BookingStore, PageRequest};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Rounds to two decimal places.
pub fn round_amount(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn label(kind: BookingKind) -> &'static str {
    match kind {
        BookingKind::Appointment => "Appointment",
        BookingKind::Pharmacy => "Pharmacy order",
        BookingKind::Ambulance => "Ambulance booking",
        BookingKind::Donation => "Donation",
    }
}

/// Creates bookings and drives their operational status changes.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    notifications: NotificationService,
    pricing: PricingConfig,
    currency: String,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifications: NotificationService,
        pricing: PricingConfig,
        currency: String,
    ) -> Self {
        Self {
            store,
            notifications,
            pricing,
            currency,
        }
    }

    #[tracing::instrument(skip(self, identity, request), fields(user_id = %identity.user_id, booking_type = %request.kind()))]
    pub async fn create_booking(
        &self,
        identity: &Identity,
        request: CreateBookingRequest,
    ) -> Result<Booking, BookingError> {
        let today = Utc::now().date_naive();
        request.validate_request(today)?;

        let kind = request.kind();
        let (amount, details) = match request {
            CreateBookingRequest::Appointment(r) => self.price_appointment(r).await?,
            CreateBookingRequest::Pharmacy(r) => self.price_pharmacy(r).await?,
            CreateBookingRequest::Ambulance(r) => self.price_ambulance(r).await?,
            CreateBookingRequest::Donation(r) => Self::price_donation(r),
        };

        let format = ReferenceFormat::for_booking(kind);
        let sequence = self.store.next_sequence(&format.counter_key(today)).await?;
        let reference_number = format.render(today, sequence);

        let booking = Booking::new(
            identity.user_id.clone(),
            reference_number,
            round_amount(amount),
            self.currency.clone(),
            details,
        );
        self.store.insert_booking(&booking).await?;

        tracing::info!(
            booking_id = %booking.id,
            reference_number = %booking.reference_number,
            amount = booking.amount,
            "Booking created"
        );
        metrics::record_booking_created(kind.as_str());
        self.notifications.booking_created(&booking).await;

        Ok(booking)
    }

    async fn price_appointment(
        &self,
        r: CreateAppointmentRequest,
    ) -> Result<(f64, BookingDetails), BookingError> {
        let doctor = self
            .store
            .find_doctor(&r.doctor_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Doctor"))?;
        if !doctor.is_available {
            return Err(BookingError::invalid_state(
                "Doctor is not available for appointments",
            ));
        }

        if let Some(hospital_id) = &r.hospital_id {
            let hospital = self
                .store
                .find_hospital(hospital_id)
                .await?
                .ok_or_else(|| BookingError::not_found("Hospital"))?;
            if !hospital.is_active {
                return Err(BookingError::invalid_state("Hospital is not active"));
            }
        }

        let date = r
            .parsed_date()
            .ok_or_else(|| BookingError::validation("date", "date must be in YYYY-MM-DD format"))?;
        let fee = r.fee.unwrap_or(doctor.consultation_fee);

        Ok((
            fee,
            BookingDetails::Appointment(AppointmentDetails {
                doctor_id: doctor.id,
                hospital_id: r.hospital_id,
                date,
                time: r.time,
                consultation_type: r.consultation_type,
                reason: r.reason,
                symptoms: r.symptoms,
                notes: r.notes,
            }),
        ))
    }

    async fn price_pharmacy(
        &self,
        r: CreatePharmacyOrderRequest,
    ) -> Result<(f64, BookingDetails), BookingError> {
        let mut requested: HashMap<&str, u32> = HashMap::new();
        for item in &r.items {
            *requested.entry(item.medicine_id.as_str()).or_default() += item.quantity;
        }

        let mut items = Vec::with_capacity(r.items.len());
        let mut needs_prescription = false;
        let mut subtotal = 0.0;
        for item in &r.items {
            let medicine = self
                .store
                .find_medicine(&item.medicine_id)
                .await?
                .ok_or_else(|| BookingError::not_found(format!("Medicine {}", item.medicine_id)))?;
            if !medicine.is_active {
                return Err(BookingError::invalid_state(format!(
                    "{} is not available",
                    medicine.name
                )));
            }
            let total_quantity = requested.get(medicine.id.as_str()).copied().unwrap_or(0);
            if medicine.stock < total_quantity {
                return Err(BookingError::invalid_state(format!(
                    "Insufficient stock for {}",
                    medicine.name
                )));
            }

            needs_prescription |= medicine.requires_prescription;
            subtotal += medicine.price * f64::from(item.quantity);
            items.push(OrderItem {
                medicine_id: medicine.id,
                name: medicine.name,
                quantity: item.quantity,
                unit_price: medicine.price,
            });
        }

        if needs_prescription && r.prescription_url.is_none() {
            return Err(BookingError::validation(
                "prescription_url",
                "A prescription is required for one or more items",
            ));
        }

        let delivery_charge = self.pricing.pharmacy_delivery_charge;
        Ok((
            subtotal + delivery_charge,
            BookingDetails::Pharmacy(PharmacyDetails {
                items,
                delivery_address: Address {
                    street: r.delivery_address.street,
                    city: r.delivery_address.city,
                    state: r.delivery_address.state,
                    zip_code: r.delivery_address.zip_code,
                },
                delivery_charge,
                prescription_url: r.prescription_url,
            }),
        ))
    }

    async fn price_ambulance(
        &self,
        r: CreateAmbulanceRequest,
    ) -> Result<(f64, BookingDetails), BookingError> {
        if let Some(appointment_id) = &r.appointment_id {
            self.store
                .get_booking(BookingKind::Appointment, appointment_id)
                .await?
                .ok_or_else(|| BookingError::not_found("Appointment"))?;
        }

        let base_fare = match r.ambulance_type {
            AmbulanceType::Basic => self.pricing.ambulance_basic_fare,
            AmbulanceType::Advanced => self.pricing.ambulance_advanced_fare,
            AmbulanceType::Cardiac => self.pricing.ambulance_cardiac_fare,
        };
        let emergency_charge = if r.is_emergency {
            self.pricing.ambulance_emergency_charge
        } else {
            0.0
        };

        let location = |l: LocationRequest| Location {
            address: l.address,
            latitude: l.latitude,
            longitude: l.longitude,
        };

        Ok((
            base_fare + emergency_charge,
            BookingDetails::Ambulance(AmbulanceDetails {
                ambulance_type: r.ambulance_type,
                pickup_address: location(r.pickup_address),
                drop_address: location(r.drop_address),
                patient: PatientInfo {
                    name: r.patient.name,
                    age: r.patient.age,
                    condition: r.patient.condition,
                },
                emergency_contact: EmergencyContact {
                    name: r.emergency_contact.name,
                    phone: r.emergency_contact.phone,
                },
                is_emergency: r.is_emergency,
                base_fare,
                emergency_charge,
                appointment_id: r.appointment_id,
            }),
        ))
    }

    fn price_donation(r: CreateDonationRequest) -> (f64, BookingDetails) {
        (
            r.amount,
            BookingDetails::Donation(DonationDetails {
                campaign: Campaign {
                    title: r.campaign.title,
                    description: r.campaign.description,
                    target_amount: r.campaign.target_amount,
                },
                is_anonymous: r.is_anonymous,
                message: r.message,
            }),
        )
    }

    /// Id of the doctor profile linked to a doctor caller.
    async fn doctor_profile(&self, identity: &Identity) -> Result<Option<String>, BookingError> {
        if identity.role != Role::Doctor {
            return Ok(None);
        }
        Ok(self
            .store
            .find_doctor_by_user_id(&identity.user_id)
            .await?
            .map(|doctor| doctor.id))
    }

    async fn load(&self, kind: BookingKind, id: &str) -> Result<Booking, BookingError> {
        self.store
            .get_booking(kind, id)
            .await?
            .ok_or_else(|| BookingError::not_found(label(kind)))
    }

    pub async fn get_booking(
        &self,
        identity: &Identity,
        kind: BookingKind,
        id: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.load(kind, id).await?;
        let profile = self.doctor_profile(identity).await?;
        AccessGuard::ensure_can_view(identity, &booking, profile.as_deref())?;
        Ok(booking)
    }

    pub async fn list_bookings(
        &self,
        identity: &Identity,
        kind: BookingKind,
        status: Option<BookingStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Booking>, u64), BookingError> {
        let profile = self.doctor_profile(identity).await?;
        let query = BookingQuery {
            scope: AccessGuard::list_scope(identity, profile.as_deref()),
            status,
            page,
        };
        self.store.list_bookings(kind, &query).await
    }

    /// Applies a status change. The write only lands if the stored status is
    /// still the one the transition was validated against.
    #[tracing::instrument(skip(self, identity, cancel_reason), fields(user_id = %identity.user_id))]
    pub async fn update_status(
        &self,
        identity: &Identity,
        kind: BookingKind,
        id: &str,
        to: BookingStatus,
        cancel_reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.load(kind, id).await?;
        let profile = self.doctor_profile(identity).await?;

        let cancel = if to == BookingStatus::Cancelled {
            AccessGuard::ensure_can_cancel(identity, &booking, profile.as_deref())?;
            Some(CancelRequest {
                cancelled_by: AccessGuard::cancelled_by(identity),
                reason: cancel_reason,
            })
        } else {
            AccessGuard::ensure_can_update_status(identity, &booking, profile.as_deref())?;
            None
        };

        let from = booking.status;
        status::transition(&mut booking, to, cancel, Utc::now())?;

        if !self.store.replace_booking_if_status(&booking, from).await? {
            let current = self.load(kind, id).await?;
            tracing::warn!(
                expected = %from,
                found = %current.status,
                "Concurrent status change detected"
            );
            return Err(BookingError::InvalidTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }

        tracing::info!(booking_id = %booking.id, from = %from, to = %to, "Booking status updated");
        metrics::record_status_change(kind.as_str(), to.as_str());
        if to == BookingStatus::Cancelled {
            self.notifications.booking_cancelled(&booking).await;
        }

        Ok(booking)
    }

    pub async fn cancel_booking(
        &self,
        identity: &Identity,
        kind: BookingKind,
        id: &str,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        self.update_status(identity, kind, id, BookingStatus::Cancelled, reason)
            .await
    }
}
