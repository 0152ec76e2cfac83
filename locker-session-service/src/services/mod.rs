//! Services module for locker-session-service.

pub mod clock;
pub mod database;
pub mod metrics;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_completion_failure, record_restore_result,
    record_session_completed, record_timer_event, set_pending_timers,
};
pub use store::{SessionStore, StoreTransaction};
