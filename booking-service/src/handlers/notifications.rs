use crate::dtos::{ApiResponse, NotificationListParams, NotificationResponse};
use crate::services::store::PageRequest;
use crate::services::Identity;
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use service_core::error::AppError;

pub async fn list_notifications(
    State(state): State<AppState>,
    identity: Identity,
    Query(params): Query<NotificationListParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = PageRequest::new(params.page, params.limit);
    let (notifications, total) = state
        .notifications
        .list(&identity, params.unread_only, page.clone())
        .await?;

    let data: Vec<NotificationResponse> = notifications
        .into_iter()
        .map(NotificationResponse::from)
        .collect();
    Ok(ApiResponse::ok("Notifications retrieved", data).with_pagination(&page, total))
}

pub async fn mark_read(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let notification = state.notifications.mark_read(&identity, &id).await?;
    Ok(ApiResponse::ok(
        "Notification marked as read",
        NotificationResponse::from(notification),
    ))
}
