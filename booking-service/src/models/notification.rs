use super::booking::BookingKind;
use super::serde_helpers::opt_chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Appointment,
    Pharmacy,
    Ambulance,
    Donation,
    Payment,
    General,
}

impl From<BookingKind> for NotificationCategory {
    fn from(kind: BookingKind) -> Self {
        match kind {
            BookingKind::Appointment => NotificationCategory::Appointment,
            BookingKind::Pharmacy => NotificationCategory::Pharmacy,
            BookingKind::Ambulance => NotificationCategory::Ambulance,
            BookingKind::Donation => NotificationCategory::Donation,
        }
    }
}

/// In-app notification shown to a user. Delivery beyond the inbox is not handled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub is_read: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: String,
        title: impl Into<String>,
        message: impl Into<String>,
        category: NotificationCategory,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            title: title.into(),
            message: message.into(),
            category,
            reference_id,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_read(&mut self) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(Utc::now());
        }
    }
}
