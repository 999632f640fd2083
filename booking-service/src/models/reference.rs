//! Read-only reference data consulted while pricing and validating bookings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    #[serde(rename = "_id")]
    pub id: String,
    /// Account id of the doctor, matched against `X-User-ID`.
    pub user_id: String,
    pub name: String,
    pub specialization: String,
    pub consultation_fee: f64,
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospital {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub emergency_services: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medicine {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub price: f64,
    pub stock: u32,
    #[serde(default)]
    pub requires_prescription: bool,
    pub is_active: bool,
}
