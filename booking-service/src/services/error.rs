use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

/// Field-level validation failure, rendered as `{ field: [message, ..] }`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid payment signature")]
    SignatureMismatch,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Payment gateway error: {0}")]
    UpstreamFailure(String),

    /// Payment committed as success but the booking could not take the paid state.
    #[error("Payment {payment_id} captured but booking {booking_id} was not updated: {reason}")]
    PartialReconciliation {
        payment_id: String,
        booking_id: String,
        reason: String,
    },

    #[error("Booking {booking_id} is already paid by payment {existing_payment_id}")]
    DuplicatePayment {
        booking_id: String,
        existing_payment_id: String,
    },

    #[error("Validation error")]
    Validation(Vec<FieldError>),

    #[error("invalid booking type: {0}")]
    InvalidBookingType(String),

    #[error("Database error: {0}")]
    Store(#[from] mongodb::error::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BookingError::NotFound(what.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        BookingError::InvalidState(message.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BookingError::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<validator::ValidationErrors> for BookingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        BookingError::Validation(field_errors(&errors))
    }
}

/// Flattens nested validator errors into dotted field paths, sorted by field.
pub fn field_errors(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    let mut fields = Vec::new();
    collect_field_errors("", errors, &mut fields);
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

fn collect_field_errors(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut Vec<FieldError>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", path));
                    out.push(FieldError::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_field_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_field_errors(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            BookingError::InvalidState(msg) => {
                AppError::domain(StatusCode::BAD_REQUEST, "invalid_state", msg)
            }
            e @ BookingError::InvalidTransition { .. } => {
                AppError::domain(StatusCode::BAD_REQUEST, "invalid_transition", e.to_string())
            }
            e @ BookingError::SignatureMismatch => {
                AppError::domain(StatusCode::BAD_REQUEST, "signature_mismatch", e.to_string())
            }
            BookingError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            BookingError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            BookingError::UpstreamFailure(msg) => AppError::BadGateway(msg),
            e @ BookingError::PartialReconciliation { .. } => {
                AppError::domain(StatusCode::CONFLICT, "partial_reconciliation", e.to_string())
            }
            e @ BookingError::DuplicatePayment { .. } => {
                AppError::domain(StatusCode::CONFLICT, "duplicate_payment", e.to_string())
            }
            BookingError::Validation(fields) => AppError::FieldErrors(
                fields
                    .into_iter()
                    .map(|f| (f.field, f.message))
                    .collect(),
            ),
            BookingError::InvalidBookingType(kind) => AppError::domain(
                StatusCode::BAD_REQUEST,
                "invalid_booking_type",
                format!("invalid booking type: {}", kind),
            ),
            BookingError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            BookingError::Internal(e) => AppError::InternalError(e),
        }
    }
}
