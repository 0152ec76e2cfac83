//! Session timer orchestration.

use crate::models::SessionStatus;
use crate::services::metrics::record_restore_result;
use crate::services::{Clock, SessionStore};
use crate::timers::completion::{CompletionHandler, CompletionOutcome, CompletionTrigger};
use crate::timers::registry::TimerRegistry;
use crate::timers::schedule;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// What `start_session_timer` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "timer", rename_all = "snake_case")]
pub enum TimerOutcome {
    /// A completion is scheduled for `fires_at`.
    Scheduled { fires_at: DateTime<Utc> },
    /// The session was already due and has been completed in-line.
    CompletedImmediately(CompletionOutcome),
    /// Session missing or not running; nothing scheduled.
    Skipped,
}

/// Summary of a startup restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub scheduled: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: Vec<Uuid>,
}

/// Owns every in-process session timer.
///
/// Construct once at startup and share through `Arc`; handlers call the
/// methods below, the startup hook calls
/// [`SessionTimerManager::restore_active_session_timers`] and the shutdown
/// hook calls [`SessionTimerManager::clear_all_timers`].
pub struct SessionTimerManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    registry: TimerRegistry,
    completion: Arc<CompletionHandler>,
}

impl SessionTimerManager {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        let completion = Arc::new(CompletionHandler::new(store.clone(), clock.clone()));
        Self {
            store,
            clock,
            registry: TimerRegistry::new(),
            completion,
        }
    }

    /// Schedule completion of a running session at its true end time.
    ///
    /// Any timer already held for the session is replaced. A session whose
    /// end time has passed is completed before this returns.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn start_session_timer(&self, session_id: Uuid) -> Result<TimerOutcome, AppError> {
        let Some(loaded) = self.store.get_session(session_id).await? else {
            debug!(session_id = %session_id, "Session not found, no timer started");
            return Ok(TimerOutcome::Skipped);
        };
        if !loaded.session.is_running() {
            debug!(
                session_id = %session_id,
                status = %loaded.session.status,
                "Session not running, no timer started"
            );
            return Ok(TimerOutcome::Skipped);
        }

        self.registry.cancel(session_id);

        let end_time = loaded.true_end_time();
        let now = self.clock.now();

        let Some(delay) = schedule::delay_until(end_time, now) else {
            info!(
                session_id = %session_id,
                end_time = %end_time,
                "Session already past its end time, completing now"
            );
            let outcome = self
                .completion
                .complete(session_id, CompletionTrigger::Overdue)
                .await?;
            return Ok(TimerOutcome::CompletedImmediately(outcome));
        };

        let completion = Arc::clone(&self.completion);
        let scheduled = self.registry.schedule(session_id, delay, move || async move {
            if let Err(e) = completion
                .complete(session_id, CompletionTrigger::Timer)
                .await
            {
                // Already logged and counted; left running for restore or manual completion.
                debug!(session_id = %session_id, error_type = e.kind(), "Timer completion failed");
            }
        });
        if !scheduled {
            return Ok(TimerOutcome::Skipped);
        }

        info!(
            session_id = %session_id,
            end_time = %end_time,
            delay_secs = delay.as_secs(),
            extensions = loaded.extensions.len(),
            "Session timer scheduled"
        );

        Ok(TimerOutcome::Scheduled { fires_at: end_time })
    }

    /// Reschedule after an extension has been persisted.
    ///
    /// The extension record must already be committed; otherwise the
    /// recomputed end time misses it.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn extend_session_timer(&self, session_id: Uuid) -> Result<TimerOutcome, AppError> {
        let outcome = self.start_session_timer(session_id).await?;
        if let TimerOutcome::Scheduled { fires_at } = &outcome {
            info!(session_id = %session_id, fires_at = %fires_at, "Session timer extended");
        }
        Ok(outcome)
    }

    /// Drop the pending timer for a session ended outside the timer engine.
    pub fn clear_session_timer(&self, session_id: Uuid) -> bool {
        let cleared = self.registry.cancel(session_id);
        if cleared {
            info!(session_id = %session_id, "Session timer cleared");
        }
        cleared
    }

    /// Complete a session on request, dropping its timer first.
    pub async fn complete_session(&self, session_id: Uuid) -> Result<CompletionOutcome, AppError> {
        self.registry.cancel(session_id);
        self.completion
            .complete(session_id, CompletionTrigger::Manual)
            .await
    }

    /// Whole minutes until the session's true end time; 0 when it is missing
    /// or not running. Does not touch timers.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn get_session_time_remaining(&self, session_id: Uuid) -> Result<i64, AppError> {
        let Some(loaded) = self.store.get_session(session_id).await? else {
            return Ok(0);
        };
        if !loaded.session.is_running() {
            return Ok(0);
        }
        Ok(schedule::remaining_minutes(
            loaded.true_end_time(),
            self.clock.now(),
        ))
    }

    /// Re-arm timers for every running session in the store.
    ///
    /// A failure for one session is logged and counted; the rest continue.
    #[instrument(skip(self))]
    pub async fn restore_active_session_timers(&self) -> Result<RestoreReport, AppError> {
        let sessions = self.store.list_sessions(&SessionStatus::RUNNING).await?;
        info!(count = sessions.len(), "Restoring session timers");

        let mut report = RestoreReport::default();
        for session in sessions {
            let session_id = session.session_id;
            match self.start_session_timer(session_id).await {
                Ok(TimerOutcome::Scheduled { .. }) => {
                    report.scheduled += 1;
                    record_restore_result("scheduled");
                }
                Ok(TimerOutcome::CompletedImmediately(_)) => {
                    report.completed += 1;
                    record_restore_result("completed");
                }
                Ok(TimerOutcome::Skipped) => {
                    report.skipped += 1;
                    record_restore_result("skipped");
                }
                Err(e) => {
                    error!(
                        session_id = %session_id,
                        error = %e,
                        "Failed to restore session timer"
                    );
                    report.failed.push(session_id);
                    record_restore_result("failed");
                }
            }
        }

        if report.failed.is_empty() {
            info!(
                scheduled = report.scheduled,
                completed = report.completed,
                skipped = report.skipped,
                "Session timers restored"
            );
        } else {
            warn!(
                scheduled = report.scheduled,
                completed = report.completed,
                skipped = report.skipped,
                failed = report.failed.len(),
                "Session timers restored with failures"
            );
        }

        Ok(report)
    }

    /// Cancel every pending timer. Called once shutdown begins.
    pub fn clear_all_timers(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        info!(cancelled = cancelled, "All session timers cleared");
        cancelled
    }

    /// Number of timers currently pending.
    pub fn pending_timers(&self) -> usize {
        self.registry.count()
    }

    pub fn has_timer(&self, session_id: Uuid) -> bool {
        self.registry.contains(session_id)
    }
}
