#![allow(dead_code)]

use booking_service::config::{
    BookingConfig, MongoConfig, PaymentsConfig, PricingConfig, RazorpayConfig,
};
use booking_service::models::{Booking, BookingKind, Doctor, Hospital, Medicine};
use booking_service::services::{
    BookingStore, Identity, InMemoryStore, MockGateway, PaymentGateway, Role,
};
use booking_service::startup::{router, AppState};
use reqwest::{Client, Method, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

pub const TEST_KEY_SECRET: &str = "test_key_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";

pub const PATIENT_ID: &str = "patient-1";
pub const OTHER_PATIENT_ID: &str = "patient-2";
pub const DOCTOR_USER_ID: &str = "doctor-user-1";
pub const ADMIN_ID: &str = "admin-1";

pub const DOCTOR_ID: &str = "doc-1";
pub const UNAVAILABLE_DOCTOR_ID: &str = "doc-2";
pub const HOSPITAL_ID: &str = "hosp-1";
pub const PARACETAMOL_ID: &str = "med-1";
pub const INSULIN_ID: &str = "med-2";

pub fn patient() -> Identity {
    Identity::new(PATIENT_ID, Role::Patient)
}

pub fn other_patient() -> Identity {
    Identity::new(OTHER_PATIENT_ID, Role::Patient)
}

pub fn doctor() -> Identity {
    Identity::new(DOCTOR_USER_ID, Role::Doctor)
}

pub fn admin() -> Identity {
    Identity::new(ADMIN_ID, Role::Admin)
}

pub fn test_config() -> BookingConfig {
    BookingConfig {
        common: service_core::config::Config {
            port: 0,
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        },
        mongodb: MongoConfig {
            uri: Secret::new("mongodb://localhost:27017".to_string()),
            database: "booking_test".to_string(),
        },
        razorpay: RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
            webhook_secret: Secret::new(TEST_WEBHOOK_SECRET.to_string()),
            api_base_url: "https://api.razorpay.com/v1".to_string(),
        },
        payments: PaymentsConfig::default(),
        pricing: PricingConfig::default(),
    }
}

/// Booking service over an in-memory store and a mock gateway, served on a
/// random local port.
pub struct TestApp {
    pub address: String,
    pub store: InMemoryStore,
    pub gateway: Arc<MockGateway>,
    pub state: AppState,
    pub client: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_gateway(MockGateway::new(TEST_KEY_SECRET, TEST_WEBHOOK_SECRET)).await
    }

    pub async fn spawn_with_gateway(gateway: MockGateway) -> Self {
        let store = InMemoryStore::new();
        seed_reference_data(&store).await;

        let gateway = Arc::new(gateway);
        let shared_store: Arc<dyn BookingStore> = Arc::new(store.clone());
        let shared_gateway: Arc<dyn PaymentGateway> = gateway.clone();
        let state = AppState::new(&test_config(), shared_store, shared_gateway);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            address: format!("http://127.0.0.1:{}", port),
            store,
            gateway,
            state,
            client: Client::new(),
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        identity: Option<&Identity>,
        body: Option<Value>,
    ) -> Response {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.address, path));
        if let Some(identity) = identity {
            request = request
                .header("X-User-ID", &identity.user_id)
                .header("X-User-Role", identity.role.to_string());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str, identity: &Identity) -> Response {
        self.request(Method::GET, path, Some(identity), None).await
    }

    pub async fn post(&self, path: &str, identity: &Identity, body: Value) -> Response {
        self.request(Method::POST, path, Some(identity), Some(body))
            .await
    }

    pub async fn patch(&self, path: &str, identity: &Identity, body: Value) -> Response {
        self.request(Method::PATCH, path, Some(identity), Some(body))
            .await
    }

    /// Sends a webhook body signed with the mock webhook secret.
    pub async fn post_webhook(&self, body: &Value) -> Response {
        let raw = serde_json::to_vec(body).unwrap();
        let signature = self.gateway.sign_webhook(&raw);
        self.client
            .post(format!("{}/webhooks/razorpay", self.address))
            .header("Content-Type", "application/json")
            .header("X-Razorpay-Signature", signature)
            .body(raw)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_donation(&self, identity: &Identity, amount: f64) -> Booking {
        self.state
            .bookings
            .create_booking(
                identity,
                booking_service::dtos::CreateBookingRequest::from_json(
                    BookingKind::Donation,
                    donation_body(amount),
                )
                .unwrap(),
            )
            .await
            .expect("Failed to create donation")
    }

    pub async fn create_appointment(&self, identity: &Identity) -> Booking {
        self.state
            .bookings
            .create_booking(
                identity,
                booking_service::dtos::CreateBookingRequest::from_json(
                    BookingKind::Appointment,
                    appointment_body(DOCTOR_ID),
                )
                .unwrap(),
            )
            .await
            .expect("Failed to create appointment")
    }

    pub async fn booking(&self, kind: BookingKind, id: &str) -> Booking {
        self.store
            .get_booking(kind, id)
            .await
            .unwrap()
            .expect("booking should exist")
    }
}

pub async fn seed_reference_data(store: &InMemoryStore) {
    store
        .seed_doctor(Doctor {
            id: DOCTOR_ID.to_string(),
            user_id: DOCTOR_USER_ID.to_string(),
            name: "Dr. Asha Rao".to_string(),
            specialization: "Cardiology".to_string(),
            consultation_fee: 800.0,
            is_available: true,
            hospital_id: Some(HOSPITAL_ID.to_string()),
        })
        .await;
    store
        .seed_doctor(Doctor {
            id: UNAVAILABLE_DOCTOR_ID.to_string(),
            user_id: "doctor-user-2".to_string(),
            name: "Dr. Vikram Shah".to_string(),
            specialization: "Dermatology".to_string(),
            consultation_fee: 600.0,
            is_available: false,
            hospital_id: None,
        })
        .await;
    store
        .seed_hospital(Hospital {
            id: HOSPITAL_ID.to_string(),
            name: "City Hospital".to_string(),
            is_active: true,
            emergency_services: true,
        })
        .await;
    store
        .seed_medicine(Medicine {
            id: PARACETAMOL_ID.to_string(),
            name: "Paracetamol 500mg".to_string(),
            price: 25.5,
            stock: 100,
            requires_prescription: false,
            is_active: true,
        })
        .await;
    store
        .seed_medicine(Medicine {
            id: INSULIN_ID.to_string(),
            name: "Insulin".to_string(),
            price: 450.0,
            stock: 3,
            requires_prescription: true,
            is_active: true,
        })
        .await;
}

/// An appointment date comfortably in the future.
pub fn future_date() -> String {
    (chrono::Utc::now().date_naive() + chrono::Duration::days(7))
        .format("%Y-%m-%d")
        .to_string()
}

pub fn appointment_body(doctor_id: &str) -> Value {
    json!({
        "doctor_id": doctor_id,
        "hospital_id": HOSPITAL_ID,
        "date": future_date(),
        "time": "10:30",
        "consultation_type": "clinic",
        "reason": "Chest pain",
        "symptoms": ["chest pain", "fatigue"]
    })
}

pub fn pharmacy_body(items: Value) -> Value {
    json!({
        "items": items,
        "delivery_address": {
            "street": "12 MG Road",
            "city": "Pune",
            "state": "Maharashtra",
            "zip_code": "411001"
        }
    })
}

pub fn ambulance_body(ambulance_type: &str, is_emergency: bool) -> Value {
    json!({
        "ambulance_type": ambulance_type,
        "pickup_address": { "address": "12 MG Road, Pune", "latitude": 18.52, "longitude": 73.85 },
        "drop_address": { "address": "City Hospital, Pune" },
        "patient": { "name": "Ravi", "age": 64, "condition": "breathlessness" },
        "emergency_contact": { "name": "Meera", "phone": "+91 98765 43210" },
        "is_emergency": is_emergency
    })
}

pub fn donation_body(amount: f64) -> Value {
    json!({
        "campaign": {
            "title": "Rural clinic equipment",
            "description": "Diagnostics for the village clinic",
            "target_amount": 500000.0
        },
        "amount": amount,
        "is_anonymous": false,
        "message": "Get well soon"
    })
}
