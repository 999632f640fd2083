use crate::services::access::{Identity, Role};
use crate::services::error::BookingError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Caller identity asserted by the upstream gateway.
///
/// A missing header is `401`; a role outside `patient | doctor | admin` is `403`.
#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?;
        let role: Role = header(parts, USER_ROLE_HEADER)?.parse()?;

        tracing::Span::current().record("user_id", user_id);

        Ok(Identity::new(user_id, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AppError::from(BookingError::Unauthorized(format!(
                "Missing {} header",
                name
            )))
        })
}
