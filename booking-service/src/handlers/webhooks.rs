use crate::dtos::{ApiResponse, WebhookAckResponse};
use crate::startup::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use service_core::error::AppError;

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Razorpay webhook. The signature covers the raw body, so the body is taken
/// as bytes and parsed only after verification.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if signature.is_none() {
        tracing::warn!("Missing X-Razorpay-Signature header");
    }

    let ack = state
        .reconciliation
        .handle_webhook(&body, signature)
        .await?;

    Ok(ApiResponse::ok(
        "Webhook acknowledged",
        WebhookAckResponse::from(ack),
    ))
}
