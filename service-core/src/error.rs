use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Error type shared by every HTTP-facing service.
///
/// All variants render into the same envelope:
/// `{ "success": false, "message": ..., "error": ... }`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    /// Validation failures collected by hand, as `(field, message)` pairs.
    #[error("Validation error")]
    FieldErrors(Vec<(String, String)>),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    /// A domain rejection with a stable machine-readable code.
    #[error("{message}")]
    Domain {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn domain(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        AppError::Domain {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::FieldErrors(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Domain { status, .. } => *status,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

/// Wire shape of every failed response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, error) = match self {
            AppError::ValidationError(err) => (
                "Validation error".to_string(),
                serde_json::to_value(err.field_errors()).ok(),
            ),
            AppError::FieldErrors(fields) => {
                let mut grouped = serde_json::Map::new();
                for (field, message) in fields {
                    let entry = grouped
                        .entry(field)
                        .or_insert_with(|| serde_json::Value::Array(Vec::new()));
                    if let serde_json::Value::Array(messages) = entry {
                        messages.push(message.into());
                    }
                }
                (
                    "Validation error".to_string(),
                    Some(serde_json::Value::Object(grouped)),
                )
            }
            AppError::BadRequest(err) => (err.to_string(), Some("bad_request".into())),
            AppError::NotFound(err) => (err.to_string(), Some("not_found".into())),
            AppError::Unauthorized(err) => (err.to_string(), Some("unauthorized".into())),
            AppError::Forbidden(err) => (err.to_string(), Some("forbidden".into())),
            AppError::Conflict(err) => (err.to_string(), Some("conflict".into())),
            AppError::Domain { code, message, .. } => (message, Some(code.into())),
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                (
                    "Internal server error".to_string(),
                    Some("internal_error".into()),
                )
            }
            AppError::BadGateway(msg) => (
                format!("Bad Gateway: {}", msg),
                Some("upstream_failure".into()),
            ),
            AppError::ServiceUnavailable => (
                "Service unavailable".to_string(),
                Some("service_unavailable".into()),
            ),
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ("Database error".to_string(), Some("database_error".into()))
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                (
                    "Configuration error".to_string(),
                    Some("configuration_error".into()),
                )
            }
        };

        (
            status,
            Json(ErrorEnvelope {
                success: false,
                message,
                error,
            }),
        )
            .into_response()
    }
}
