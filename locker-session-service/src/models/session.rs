//! Session and extension models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::timers::schedule;

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Extended,
    Completed,
    Interrupted,
    EmergencyAccessed,
}

impl SessionStatus {
    /// Statuses for which a session holds its locker and owns a timer.
    pub const RUNNING: [SessionStatus; 2] = [SessionStatus::Active, SessionStatus::Extended];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Extended => "EXTENDED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Interrupted => "INTERRUPTED",
            SessionStatus::EmergencyAccessed => "EMERGENCY_ACCESSED",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(SessionStatus::Active),
            "EXTENDED" => Some(SessionStatus::Extended),
            "COMPLETED" => Some(SessionStatus::Completed),
            "INTERRUPTED" => Some(SessionStatus::Interrupted),
            "EMERGENCY_ACCESSED" => Some(SessionStatus::EmergencyAccessed),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        Self::RUNNING.contains(self)
    }
}

/// A single locker rental.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub locker_id: Uuid,
    pub status: String,
    pub start_time: DateTime<Utc>,
    /// Planned duration in whole minutes.
    pub planned_duration: i32,
    /// Set only on completion.
    pub actual_duration: Option<i32>,
    /// Set only on completion.
    pub end_time: Option<DateTime<Utc>>,
    pub unlock_code: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Session {
    /// Parsed status; `None` for a value this service does not know.
    pub fn status(&self) -> Option<SessionStatus> {
        SessionStatus::from_string(&self.status)
    }

    /// Whether the session is ACTIVE or EXTENDED.
    pub fn is_running(&self) -> bool {
        self.status().is_some_and(|s| s.is_running())
    }
}

/// Append-only record of minutes added to a session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionExtension {
    pub extension_id: Uuid,
    pub session_id: Uuid,
    pub minutes: i32,
    pub created_utc: DateTime<Utc>,
}

/// A session loaded together with all of its extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWithExtensions {
    pub session: Session,
    pub extensions: Vec<SessionExtension>,
}

impl SessionWithExtensions {
    /// Start time plus planned duration plus every extension.
    pub fn true_end_time(&self) -> DateTime<Utc> {
        schedule::true_end_time(
            self.session.start_time,
            self.session.planned_duration,
            self.extensions.iter().map(|e| e.minutes),
        )
    }
}

/// Fields written to a session row. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub end_time: Option<DateTime<Utc>>,
    pub actual_duration: Option<i32>,
}
