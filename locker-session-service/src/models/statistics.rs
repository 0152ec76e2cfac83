//! Daily usage statistics model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One aggregate row per calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageStatistics {
    pub stat_date: NaiveDate,
    pub total_sessions: i32,
    pub total_users: i32,
    /// Whole minutes, maintained as a running mean.
    pub avg_session_time: i32,
    pub locker_utilization: f64,
    /// Yen.
    pub total_revenue: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Increment applied to a day's statistics by one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsDelta {
    pub sessions: i32,
    pub new_users: i32,
    /// Duration of the completed session in minutes.
    pub session_minutes: i32,
}

impl StatisticsDelta {
    pub fn for_completion(session_minutes: i32, first_for_user: bool) -> Self {
        Self {
            sessions: 1,
            new_users: i32::from(first_for_user),
            session_minutes,
        }
    }
}

impl UsageStatistics {
    /// Incremental mean after `sample` joins `count` earlier sessions.
    ///
    /// The stored average is whole minutes, so each step rounds and the
    /// result drifts from an exact recompute over the day's sessions.
    pub fn running_average(current_avg: i32, count: i32, sample: i32) -> i32 {
        let next = f64::from(current_avg)
            + (f64::from(sample) - f64::from(current_avg)) / f64::from(count + 1);
        next.round() as i32
    }
}
