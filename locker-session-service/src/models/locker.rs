//! Locker model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Locker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockerStatus {
    Available,
    Occupied,
    Maintenance,
    OutOfOrder,
    Reserved,
}

impl LockerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockerStatus::Available => "AVAILABLE",
            LockerStatus::Occupied => "OCCUPIED",
            LockerStatus::Maintenance => "MAINTENANCE",
            LockerStatus::OutOfOrder => "OUT_OF_ORDER",
            LockerStatus::Reserved => "RESERVED",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(LockerStatus::Available),
            "OCCUPIED" => Some(LockerStatus::Occupied),
            "MAINTENANCE" => Some(LockerStatus::Maintenance),
            "OUT_OF_ORDER" => Some(LockerStatus::OutOfOrder),
            "RESERVED" => Some(LockerStatus::Reserved),
            _ => None,
        }
    }
}

/// Physical storage unit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Locker {
    pub locker_id: Uuid,
    pub locker_number: String,
    pub status: String,
    pub total_usage_hours: f64,
    pub total_usage_count: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Locker {
    pub fn status(&self) -> Option<LockerStatus> {
        LockerStatus::from_string(&self.status)
    }
}

/// Changes applied to a locker row.
#[derive(Debug, Clone, Default)]
pub struct LockerUpdate {
    pub status: Option<LockerStatus>,
    /// Added to `total_usage_hours`.
    pub add_usage_hours: f64,
}
