mod common;

use booking_service::models::{BookingKind, BookingStatus, CancelledBy};
use common::*;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn doctor_moves_appointment_through_its_lifecycle() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;
    let path = format!("/api/bookings/appointment/{}/status", booking.id);

    for status in ["confirmed", "rescheduled", "confirmed", "completed"] {
        let response = app
            .patch(&path, &doctor(), json!({ "status": status }))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "moving to {}", status);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["data"]["status"], status);
    }

    let stored = app.booking(BookingKind::Appointment, &booking.id).await;
    assert_eq!(stored.status, BookingStatus::Completed);
    assert!(stored.timeline.confirmed_at.is_some());
    assert!(stored.timeline.completed_at.is_some());
}

#[tokio::test]
async fn illegal_transition_is_rejected_without_writing() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;

    let response = app
        .patch(
            &format!("/api/bookings/appointment/{}/status", booking.id),
            &admin(),
            json!({ "status": "completed" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_transition");
    assert_eq!(body["message"], "Cannot change status from pending to completed");

    let stored = app.booking(BookingKind::Appointment, &booking.id).await;
    assert_eq!(stored.status, BookingStatus::Pending);
}

#[tokio::test]
async fn status_outside_the_lifecycle_is_rejected() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;

    let response = app
        .patch(
            &format!("/api/bookings/appointment/{}/status", booking.id),
            &admin(),
            json!({ "status": "out_for_delivery" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patients_cannot_drive_operational_status() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;

    let response = app
        .patch(
            &format!("/api/bookings/appointment/{}/status", booking.id),
            &patient(),
            json!({ "status": "confirmed" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn owner_cancels_with_a_reason() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;
    let path = format!("/api/bookings/appointment/{}/cancel", booking.id);

    let response = app.patch(&path, &patient(), json!({})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]["cancel_reason"].is_array());

    let response = app
        .patch(&path, &patient(), json!({ "cancel_reason": "Feeling better" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["cancellation"]["cancelled_by"], "patient");
    assert_eq!(body["data"]["cancellation"]["reason"], "Feeling better");

    let stored = app.booking(BookingKind::Appointment, &booking.id).await;
    let cancellation = stored.cancellation.unwrap();
    assert_eq!(cancellation.cancelled_by, CancelledBy::Patient);
    assert!(stored.timeline.cancelled_at.is_some());

    let response = app
        .patch(&path, &patient(), json!({ "cancel_reason": "again" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_transition");

    let titles: Vec<String> = app
        .store
        .notifications_for(PATIENT_ID)
        .await
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert!(titles.contains(&"Booking cancelled".to_string()));
}

#[tokio::test]
async fn strangers_cannot_cancel() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;

    let response = app
        .patch(
            &format!("/api/bookings/appointment/{}/cancel", booking.id),
            &other_patient(),
            json!({ "cancel_reason": "not mine" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let stored = app.booking(BookingKind::Appointment, &booking.id).await;
    assert_eq!(stored.status, BookingStatus::Pending);
}

#[tokio::test]
async fn unpaid_ambulance_is_not_dispatched() {
    let app = TestApp::spawn().await;
    let response = app
        .post(
            "/api/bookings/ambulance",
            &patient(),
            ambulance_body("basic", false),
        )
        .await;
    let body: Value = response.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let path = format!("/api/bookings/ambulance/{}/status", id);

    let response = app
        .patch(&path, &admin(), json!({ "status": "confirmed" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .patch(&path, &admin(), json!({ "status": "dispatched" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn emergency_ambulance_runs_its_full_lifecycle() {
    let app = TestApp::spawn().await;
    let response = app
        .post(
            "/api/bookings/ambulance",
            &patient(),
            ambulance_body("cardiac", true),
        )
        .await;
    let body: Value = response.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let path = format!("/api/bookings/ambulance/{}/status", id);

    for status in ["confirmed", "dispatched", "arrived", "in_transit", "completed"] {
        let response = app
            .patch(&path, &admin(), json!({ "status": status }))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "moving to {}", status);
    }

    let stored = app.booking(BookingKind::Ambulance, &id).await;
    assert_eq!(stored.status, BookingStatus::Completed);
    assert!(stored.timeline.dispatched_at.is_some());
}

#[tokio::test]
async fn concurrent_status_changes_apply_once() {
    let app = TestApp::spawn().await;
    let booking = app.create_appointment(&patient()).await;
    let service = &app.state.bookings;
    let admin_user = admin();
    let patient_user = patient();

    let (confirm, cancel) = tokio::join!(
        service.update_status(
            &admin_user,
            BookingKind::Appointment,
            &booking.id,
            BookingStatus::Confirmed,
            None,
        ),
        service.cancel_booking(
            &patient_user,
            BookingKind::Appointment,
            &booking.id,
            Some("changed plans".to_string()),
        ),
    );

    let stored = app.booking(BookingKind::Appointment, &booking.id).await;
    match (confirm, cancel) {
        (Ok(_), Ok(_)) => assert_eq!(stored.status, BookingStatus::Cancelled),
        (Ok(_), Err(_)) => assert_eq!(stored.status, BookingStatus::Confirmed),
        (Err(_), Ok(_)) => assert_eq!(stored.status, BookingStatus::Cancelled),
        (Err(a), Err(b)) => panic!("both status changes failed: {} / {}", a, b),
    }
}
