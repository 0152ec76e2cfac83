//! Domain models for locker-session-service.

mod locker;
mod session;
mod statistics;

pub use locker::{Locker, LockerStatus, LockerUpdate};
pub use session::{Session, SessionExtension, SessionStatus, SessionUpdate, SessionWithExtensions};
pub use statistics::{StatisticsDelta, UsageStatistics};
