//! Metrics module for locker-session-service.
//! Provides Prometheus metrics for session timers and completions.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "locker_session_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Timer lifecycle counter (scheduled, replaced, cancelled, fired)
pub static TIMER_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Pending timers gauge
pub static PENDING_TIMERS: OnceLock<IntGauge> = OnceLock::new();

/// Completed sessions by trigger
pub static SESSIONS_COMPLETED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Failed completion attempts by trigger
pub static COMPLETION_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Startup restore results
pub static RESTORED_TIMERS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    TIMER_EVENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "locker_session_timer_events_total",
                "Session timer lifecycle events by type"
            ),
            &["event"]
        )
        .expect("Failed to register TIMER_EVENTS_TOTAL")
    });

    PENDING_TIMERS.get_or_init(|| {
        register_int_gauge!(opts!(
            "locker_session_pending_timers",
            "Session timers currently scheduled"
        ))
        .expect("Failed to register PENDING_TIMERS")
    });

    SESSIONS_COMPLETED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "locker_session_completed_total",
                "Sessions completed by trigger"
            ),
            &["trigger"]
        )
        .expect("Failed to register SESSIONS_COMPLETED_TOTAL")
    });

    COMPLETION_FAILURES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "locker_session_completion_failures_total",
                "Session completions rolled back by trigger and error type"
            ),
            &["trigger", "error_type"]
        )
        .expect("Failed to register COMPLETION_FAILURES_TOTAL")
    });

    RESTORED_TIMERS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "locker_session_restored_timers_total",
                "Startup timer restore results"
            ),
            &["result"]
        )
        .expect("Failed to register RESTORED_TIMERS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a timer lifecycle event.
pub fn record_timer_event(event: &str) {
    if let Some(counter) = TIMER_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event]).inc();
    }
}

/// Publish the number of pending timers.
pub fn set_pending_timers(count: usize) {
    if let Some(gauge) = PENDING_TIMERS.get() {
        gauge.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

/// Record a completed session.
pub fn record_session_completed(trigger: &str) {
    if let Some(counter) = SESSIONS_COMPLETED_TOTAL.get() {
        counter.with_label_values(&[trigger]).inc();
    }
}

/// Record a failed completion.
pub fn record_completion_failure(trigger: &str, error_type: &str) {
    if let Some(counter) = COMPLETION_FAILURES_TOTAL.get() {
        counter.with_label_values(&[trigger, error_type]).inc();
    }
}

/// Record one session's restore result.
pub fn record_restore_result(result: &str) {
    if let Some(counter) = RESTORED_TIMERS_TOTAL.get() {
        counter.with_label_values(&[result]).inc();
    }
}
