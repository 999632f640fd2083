mod common;

use booking_service::dtos::CreateBookingRequest;
use booking_service::models::{BookingKind, BookingStatus, PaymentStatus};
use common::*;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::HashSet;

#[tokio::test]
async fn create_appointment_uses_doctor_fee() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/bookings/appointment", &patient(), appointment_body(DOCTOR_ID))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Booking created");

    let data = &body["data"];
    assert_eq!(data["booking_type"], "appointment");
    assert_eq!(data["owner_id"], PATIENT_ID);
    assert_eq!(data["amount"], 800.0);
    assert_eq!(data["currency"], "INR");
    assert_eq!(data["status"], "pending");
    assert_eq!(data["payment_status"], "pending");
    assert!(data["payment_id"].is_null());
    assert_eq!(data["reference_number"], "APT000001");
    assert_eq!(data["details"]["appointment"]["doctor_id"], DOCTOR_ID);
}

#[tokio::test]
async fn explicit_appointment_fee_overrides_doctor_fee() {
    let app = TestApp::spawn().await;
    let mut body = appointment_body(DOCTOR_ID);
    body["fee"] = json!(1200.0);

    let response = app.post("/api/bookings/appointment", &patient(), body).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["amount"], 1200.0);
}

#[tokio::test]
async fn unknown_doctor_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/bookings/appointment", &patient(), appointment_body("doc-404"))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["message"], "Doctor not found");
}

#[tokio::test]
async fn unavailable_doctor_is_invalid_state() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/bookings/appointment",
            &patient(),
            appointment_body(UNAVAILABLE_DOCTOR_ID),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn validation_errors_are_reported_per_field() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/bookings/appointment",
            &patient(),
            json!({
                "doctor_id": DOCTOR_ID,
                "date": "2001-01-01",
                "time": "half past ten"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Validation error");
    assert_eq!(body["error"]["date"][0], "date cannot be in the past");
    assert_eq!(body["error"]["time"][0], "time must be in HH:MM format");
    assert_eq!(app.store.payment_count().await, 0);
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/bookings/donation", &patient(), json!({ "amount": "lots" }))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]["body"].is_array());
}

#[tokio::test]
async fn pharmacy_order_prices_items_plus_delivery() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/bookings/pharmacy",
            &patient(),
            pharmacy_body(json!([{ "medicine_id": PARACETAMOL_ID, "quantity": 2 }])),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(data["amount"], 101.0);
    assert_eq!(data["details"]["pharmacy"]["delivery_charge"], 50.0);
    assert_eq!(
        data["details"]["pharmacy"]["items"][0]["name"],
        "Paracetamol 500mg"
    );
    assert_eq!(data["details"]["pharmacy"]["items"][0]["unit_price"], 25.5);

    let reference = data["reference_number"].as_str().unwrap();
    assert!(reference.starts_with("MED"));
    assert!(reference.ends_with("0001"));
    assert_eq!(reference.len(), "MED".len() + 8 + 4);
}

#[tokio::test]
async fn prescription_medicine_requires_prescription_url() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/bookings/pharmacy",
            &patient(),
            pharmacy_body(json!([{ "medicine_id": INSULIN_ID, "quantity": 1 }])),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]["prescription_url"].is_array());

    let mut with_prescription =
        pharmacy_body(json!([{ "medicine_id": INSULIN_ID, "quantity": 1 }]));
    with_prescription["prescription_url"] = json!("https://files.example.com/rx/1.pdf");
    let response = app
        .post("/api/bookings/pharmacy", &patient(), with_prescription)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn insufficient_stock_counts_repeated_items() {
    let app = TestApp::spawn().await;
    let mut body = pharmacy_body(json!([
        { "medicine_id": INSULIN_ID, "quantity": 2 },
        { "medicine_id": INSULIN_ID, "quantity": 2 }
    ]));
    body["prescription_url"] = json!("https://files.example.com/rx/1.pdf");

    let response = app.post("/api/bookings/pharmacy", &patient(), body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");
    assert_eq!(body["message"], "Insufficient stock for Insulin");
}

#[tokio::test]
async fn unknown_medicine_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/bookings/pharmacy",
            &patient(),
            pharmacy_body(json!([{ "medicine_id": "med-404", "quantity": 1 }])),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn emergency_ambulance_adds_emergency_charge() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/bookings/ambulance",
            &patient(),
            ambulance_body("advanced", true),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(data["amount"], 3000.0);
    assert_eq!(data["details"]["ambulance"]["base_fare"], 2500.0);
    assert_eq!(data["details"]["ambulance"]["emergency_charge"], 500.0);

    let response = app
        .post(
            "/api/bookings/ambulance",
            &patient(),
            ambulance_body("basic", false),
        )
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["amount"], 1500.0);
}

#[tokio::test]
async fn ambulance_linked_to_missing_appointment_is_not_found() {
    let app = TestApp::spawn().await;
    let mut body = ambulance_body("basic", false);
    body["appointment_id"] = json!("missing-appointment");

    let response = app.post("/api/bookings/ambulance", &patient(), body).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn donation_below_minimum_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/bookings/donation", &patient(), donation_body(0.5))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["amount"][0], "amount must be at least 1");
}

#[tokio::test]
async fn concurrent_creations_get_distinct_reference_numbers() {
    let app = TestApp::spawn().await;
    let identity = patient();

    let creations = (0..10).map(|_| {
        let bookings = app.state.bookings.clone();
        let identity = identity.clone();
        async move {
            let request =
                CreateBookingRequest::from_json(BookingKind::Donation, donation_body(100.0))
                    .unwrap();
            bookings.create_booking(&identity, request).await.unwrap()
        }
    });
    let created = futures::future::join_all(creations).await;

    let references: HashSet<String> = created
        .iter()
        .map(|b| b.reference_number.clone())
        .collect();
    assert_eq!(references.len(), 10);

    let today = chrono::Utc::now().date_naive().format("%Y%m%d").to_string();
    let expected: HashSet<String> = (1..=10)
        .map(|n| format!("DON{}{:04}", today, n))
        .collect();
    assert_eq!(references, expected);

    for booking in &created {
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
    }
}

#[tokio::test]
async fn unknown_booking_type_is_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/bookings/hotel", &patient(), json!({}))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_booking_type");
    assert_eq!(body["message"], "invalid booking type: hotel");
}

#[tokio::test]
async fn patients_only_see_their_own_bookings() {
    let app = TestApp::spawn().await;
    let mine = app.create_appointment(&patient()).await;
    app.create_appointment(&other_patient()).await;

    let response = app.get("/api/bookings/appointment", &patient()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], mine.id.as_str());
    assert_eq!(body["pagination"]["total"], 1);

    let response = app
        .get(
            &format!("/api/bookings/appointment/{}", mine.id),
            &other_patient(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn doctor_sees_appointments_booked_with_them() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;
    app.create_donation(&patient(), 100.0).await;

    let response = app.get("/api/bookings/appointment", &doctor()).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], booking.id.as_str());

    let response = app.get("/api/bookings/donation", &doctor()).await;
    let body: Value = response.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_lists_everything_with_pagination() {
    let app = TestApp::spawn().await;
    for _ in 0..3 {
        app.create_donation(&patient(), 100.0).await;
    }
    app.create_donation(&other_patient(), 100.0).await;

    let response = app
        .get("/api/bookings/donation?page=2&limit=3", &admin())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["pagination"],
        json!({ "page": 2, "limit": 3, "total": 4, "pages": 2 })
    );
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;
    app.create_appointment(&patient()).await;
    app.state
        .bookings
        .update_status(
            &admin(),
            BookingKind::Appointment,
            &booking.id,
            BookingStatus::Confirmed,
            None,
        )
        .await
        .unwrap();

    let response = app
        .get("/api/bookings/appointment?status=confirmed", &patient())
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["status"], "confirmed");

    let response = app
        .get("/api/bookings/appointment?status=shipped", &patient())
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn creating_a_booking_notifies_the_owner() {
    let app = TestApp::spawn().await;
    let booking = app.create_donation(&patient(), 250.0).await;

    let notifications = app.store.notifications_for(PATIENT_ID).await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Booking created");
    assert_eq!(notifications[0].reference_id.as_deref(), Some(booking.id.as_str()));
}
