//! Wall-clock abstraction.

use chrono::{DateTime, Utc};
use std::fmt;

/// Source of the current time for scheduling and completion.
///
/// Production injects [`SystemClock`]. Tests inject a clock that follows
/// Tokio's paused time so timers and timestamps advance together.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
