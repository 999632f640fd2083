use super::booking_kind;
use crate::dtos::{
    ApiJson, ApiResponse, BookingListParams, BookingResponse, CancelBookingRequest,
    CreateBookingRequest, UpdateStatusRequest,
};
use crate::models::BookingStatus;
use crate::services::error::BookingError;
use crate::services::store::PageRequest;
use crate::services::Identity;
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use service_core::error::AppError;

fn parse_status(value: &str) -> Result<BookingStatus, BookingError> {
    value
        .parse::<BookingStatus>()
        .map_err(|e| BookingError::validation("status", e.to_string()))
}

pub async fn create_booking(
    State(state): State<AppState>,
    identity: Identity,
    Path(kind): Path<String>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let kind = booking_kind(&kind)?;
    let request = CreateBookingRequest::from_json(kind, body)?;
    let booking = state.bookings.create_booking(&identity, request).await?;

    Ok(ApiResponse::created(
        "Booking created",
        BookingResponse::from(booking),
    ))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    identity: Identity,
    Path(kind): Path<String>,
    Query(params): Query<BookingListParams>,
) -> Result<impl IntoResponse, AppError> {
    let kind = booking_kind(&kind)?;
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let page = PageRequest::new(params.page, params.limit);

    let (bookings, total) = state
        .bookings
        .list_bookings(&identity, kind, status, page.clone())
        .await?;

    let data: Vec<BookingResponse> = bookings.into_iter().map(BookingResponse::from).collect();
    Ok(ApiResponse::ok("Bookings retrieved", data).with_pagination(&page, total))
}

pub async fn get_booking(
    State(state): State<AppState>,
    identity: Identity,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = booking_kind(&kind)?;
    let booking = state.bookings.get_booking(&identity, kind, &id).await?;

    Ok(ApiResponse::ok(
        "Booking retrieved",
        BookingResponse::from(booking),
    ))
}

pub async fn update_status(
    State(state): State<AppState>,
    identity: Identity,
    Path((kind, id)): Path<(String, String)>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = booking_kind(&kind)?;
    let status = parse_status(&payload.status)?;
    let booking = state
        .bookings
        .update_status(&identity, kind, &id, status, payload.cancel_reason)
        .await?;

    Ok(ApiResponse::ok(
        "Booking status updated",
        BookingResponse::from(booking),
    ))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    identity: Identity,
    Path((kind, id)): Path<(String, String)>,
    ApiJson(payload): ApiJson<CancelBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = booking_kind(&kind)?;
    let booking = state
        .bookings
        .cancel_booking(&identity, kind, &id, payload.cancel_reason)
        .await?;

    Ok(ApiResponse::ok(
        "Booking cancelled",
        BookingResponse::from(booking),
    ))
}
