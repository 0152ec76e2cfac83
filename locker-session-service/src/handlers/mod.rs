pub mod health;
pub mod sessions;

pub use health::{health_check, metrics_handler, readiness_check};
pub use sessions::{
    clear_session_timer, complete_session, extend_session_timer, get_session_time_remaining,
    pending_timers, start_session_timer,
};
