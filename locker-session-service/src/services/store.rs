//! Persistence seam consumed by the timer engine.

use crate::models::{
    Locker, LockerUpdate, Session, SessionStatus, SessionUpdate, SessionWithExtensions,
    StatisticsDelta, UsageStatistics,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use uuid::Uuid;

/// Record store holding sessions, extensions, lockers and daily statistics.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Cheap round trip used by the liveness and readiness checks.
    async fn health_check(&self) -> Result<(), AppError>;

    /// Load a session with all of its extensions.
    async fn get_session(&self, session_id: Uuid)
        -> Result<Option<SessionWithExtensions>, AppError>;

    async fn get_locker(&self, locker_id: Uuid) -> Result<Option<Locker>, AppError>;

    /// List sessions whose status is one of `statuses`.
    async fn list_sessions(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, AppError>;

    /// Open an atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError>;
}

/// Atomic unit of work over the store.
///
/// Nothing is visible to other readers until [`StoreTransaction::commit`];
/// dropping the transaction without committing rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Load a session and hold it against concurrent writers until the
    /// transaction ends.
    async fn lock_session(&mut self, session_id: Uuid) -> Result<Option<Session>, AppError>;

    /// Load a locker and hold it until the transaction ends.
    async fn lock_locker(&mut self, locker_id: Uuid) -> Result<Option<Locker>, AppError>;

    async fn update_session(
        &mut self,
        session_id: Uuid,
        update: &SessionUpdate,
    ) -> Result<(), AppError>;

    async fn update_locker(&mut self, locker_id: Uuid, update: &LockerUpdate)
        -> Result<(), AppError>;

    /// Whether `user_id` completed any session other than `excluding` within
    /// `[from, to)`.
    async fn user_completed_between(
        &mut self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        excluding: Uuid,
    ) -> Result<bool, AppError>;

    /// Create the day's row from `delta`, or fold `delta` into the existing one.
    async fn upsert_daily_statistics(
        &mut self,
        date: NaiveDate,
        delta: &StatisticsDelta,
    ) -> Result<UsageStatistics, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
