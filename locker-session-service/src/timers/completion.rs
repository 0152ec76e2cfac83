//! Atomic session completion: session, locker and statistics in one unit.

use crate::models::{LockerStatus, LockerUpdate, SessionStatus, SessionUpdate, StatisticsDelta};
use crate::services::metrics::{record_completion_failure, record_session_completed};
use crate::services::{Clock, SessionStore};
use crate::timers::schedule;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What caused a completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionTrigger {
    /// A scheduled timer fired.
    Timer,
    /// The session was already past its end when its timer was started.
    Overdue,
    /// An explicit request from outside the timer engine.
    Manual,
}

impl CompletionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionTrigger::Timer => "timer",
            CompletionTrigger::Overdue => "overdue",
            CompletionTrigger::Manual => "manual",
        }
    }
}

/// Result of a completion attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Completed { actual_duration: i32 },
    /// Session was already COMPLETED, INTERRUPTED or EMERGENCY_ACCESSED.
    AlreadyTerminal,
    /// No such session.
    SessionNotFound,
    /// The session's locker row does not exist; nothing was changed.
    LockerNotFound,
}

/// Moves a running session to COMPLETED, frees its locker and records the
/// day's usage.
pub struct CompletionHandler {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl CompletionHandler {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Complete `session_id`. Safe to call more than once; only the first
    /// call against a running session changes anything.
    #[instrument(skip(self), fields(session_id = %session_id, trigger = trigger.as_str()))]
    pub async fn complete(
        &self,
        session_id: Uuid,
        trigger: CompletionTrigger,
    ) -> Result<CompletionOutcome, AppError> {
        match self.complete_in_transaction(session_id).await {
            Ok(CompletionOutcome::Completed { actual_duration }) => {
                record_session_completed(trigger.as_str());
                info!(
                    session_id = %session_id,
                    trigger = trigger.as_str(),
                    actual_duration = actual_duration,
                    "Session completed"
                );
                Ok(CompletionOutcome::Completed { actual_duration })
            }
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                record_completion_failure(trigger.as_str(), e.kind());
                tracing::error!(
                    session_id = %session_id,
                    trigger = trigger.as_str(),
                    error = %e,
                    "Session completion rolled back"
                );
                Err(e)
            }
        }
    }

    async fn complete_in_transaction(
        &self,
        session_id: Uuid,
    ) -> Result<CompletionOutcome, AppError> {
        let mut tx = self.store.begin().await?;

        // The row lock serialises racing completions; the loser sees COMPLETED.
        let Some(session) = tx.lock_session(session_id).await? else {
            info!(session_id = %session_id, "Session not found, nothing to complete");
            return Ok(CompletionOutcome::SessionNotFound);
        };
        if !session.is_running() {
            info!(
                session_id = %session_id,
                status = %session.status,
                "Session already terminal, nothing to complete"
            );
            return Ok(CompletionOutcome::AlreadyTerminal);
        }

        if tx.lock_locker(session.locker_id).await?.is_none() {
            warn!(
                session_id = %session_id,
                locker_id = %session.locker_id,
                "Locker missing for session, leaving session untouched"
            );
            return Ok(CompletionOutcome::LockerNotFound);
        }

        let now = self.clock.now();
        let actual_duration = schedule::actual_duration_minutes(session.start_time, now);

        tx.update_session(
            session_id,
            &SessionUpdate {
                status: Some(SessionStatus::Completed),
                end_time: Some(now),
                actual_duration: Some(actual_duration),
            },
        )
        .await?;

        tx.update_locker(
            session.locker_id,
            &LockerUpdate {
                status: Some(LockerStatus::Available),
                add_usage_hours: f64::from(actual_duration) / 60.0,
            },
        )
        .await?;

        let day = schedule::statistics_day(now);
        let (day_start, day_end) = schedule::day_bounds(day);
        let returning_user = tx
            .user_completed_between(session.user_id, day_start, day_end, session_id)
            .await?;
        tx.upsert_daily_statistics(
            day,
            &StatisticsDelta::for_completion(actual_duration, !returning_user),
        )
        .await?;

        tx.commit().await?;

        Ok(CompletionOutcome::Completed { actual_duration })
    }
}
