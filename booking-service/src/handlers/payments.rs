use super::booking_kind;
use crate::dtos::{
    ApiJson, ApiResponse, CreatePaymentOrderRequest, PaymentListParams, PaymentOrderResponse,
    PaymentResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::services::error::BookingError;
use crate::services::store::PageRequest;
use crate::services::Identity;
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use service_core::error::AppError;
use validator::Validate;

/// Creates a gateway order for a booking. The client opens checkout with the
/// returned `razorpay_order_id` and `razorpay_key_id`.
pub async fn create_order(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(payload): ApiJson<CreatePaymentOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(BookingError::from)?;
    let kind = booking_kind(&payload.booking_type)?;

    let order = state
        .reconciliation
        .create_payment_order(&identity, kind, &payload.booking_id, payload.amount)
        .await?;

    Ok(ApiResponse::created(
        "Payment order created",
        PaymentOrderResponse::from(order),
    ))
}

/// Checkout callback: verifies the signature and settles the payment.
pub async fn verify_payment(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(payload): ApiJson<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(BookingError::from)?;

    tracing::info!(
        user_id = %identity.user_id,
        razorpay_order_id = %payload.razorpay_order_id,
        "Verifying payment"
    );

    let verification = state
        .reconciliation
        .verify_payment(
            &payload.razorpay_order_id,
            &payload.razorpay_payment_id,
            &payload.razorpay_signature,
        )
        .await?;

    let message = if verification.replayed {
        "Payment already verified"
    } else {
        "Payment verified successfully"
    };
    Ok(ApiResponse::ok(
        message,
        VerifyPaymentResponse::from(verification),
    ))
}

pub async fn list_payments(
    State(state): State<AppState>,
    identity: Identity,
    Query(params): Query<PaymentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let booking_type = params
        .booking_type
        .as_deref()
        .map(booking_kind)
        .transpose()?;
    let page = PageRequest::new(params.page, params.limit);

    let (payments, total) = state
        .reconciliation
        .list_payments(&identity, booking_type, params.status, page.clone())
        .await?;

    let data: Vec<PaymentResponse> = payments.into_iter().map(PaymentResponse::from).collect();
    Ok(ApiResponse::ok("Payments retrieved", data).with_pagination(&page, total))
}

pub async fn get_payment(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state.reconciliation.get_payment(&identity, &id).await?;
    Ok(ApiResponse::ok(
        "Payment retrieved",
        PaymentResponse::from(payment),
    ))
}
