//! Test helper module for locker-session-service integration tests.
//!
//! Provides an in-memory store with fault injection and a clock that follows
//! Tokio's paused time, so timers and timestamps advance together.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use locker_session_service::models::{
    Locker, LockerStatus, LockerUpdate, Session, SessionExtension, SessionStatus, SessionUpdate,
    SessionWithExtensions, StatisticsDelta, UsageStatistics,
};
use locker_session_service::services::{Clock, SessionStore, StoreTransaction};
use locker_session_service::timers::SessionTimerManager;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Fixed wall-clock origin for every test.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 7, 10, 0, 0).unwrap()
}

/// Let spawned timer tasks run after a time advance.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused Tokio time by whole minutes and let fired timers finish.
pub async fn advance_minutes(minutes: u64) {
    tokio::time::advance(std::time::Duration::from_secs(minutes * 60)).await;
    settle().await;
}

/// Wall clock pinned to Tokio's (paused) time.
#[derive(Debug)]
pub struct VirtualClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl VirtualClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.origin;
        self.base + Duration::from_std(elapsed).unwrap()
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    sessions: HashMap<Uuid, Session>,
    extensions: Vec<SessionExtension>,
    lockers: HashMap<Uuid, Locker>,
    statistics: HashMap<NaiveDate, UsageStatistics>,
}

/// In-memory store. Transactions take an exclusive lock over the whole
/// state and stage their writes on a copy until commit.
#[derive(Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    failing_sessions: StdMutex<HashSet<Uuid>>,
    fail_commits: AtomicBool,
    fail_list: AtomicBool,
    unhealthy: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_locker(&self) -> Uuid {
        let locker_id = Uuid::new_v4();
        let mut state = self.state.lock().await;
        let number = format!("L{}", state.lockers.len() + 1);
        state.lockers.insert(
            locker_id,
            Locker {
                locker_id,
                locker_number: number,
                status: LockerStatus::Available.as_str().to_string(),
                total_usage_hours: 0.0,
                total_usage_count: 0,
                created_utc: base_time(),
                updated_utc: base_time(),
            },
        );
        locker_id
    }

    /// Insert an ACTIVE session and mark its locker OCCUPIED, the way the
    /// session-creation handler does.
    pub async fn insert_session(
        &self,
        locker_id: Uuid,
        start_time: DateTime<Utc>,
        planned_duration: i32,
    ) -> Uuid {
        self.insert_session_for_user(Uuid::new_v4(), locker_id, start_time, planned_duration)
            .await
    }

    pub async fn insert_session_for_user(
        &self,
        user_id: Uuid,
        locker_id: Uuid,
        start_time: DateTime<Utc>,
        planned_duration: i32,
    ) -> Uuid {
        let session_id = Uuid::new_v4();
        let mut state = self.state.lock().await;
        state.sessions.insert(
            session_id,
            Session {
                session_id,
                user_id,
                locker_id,
                status: SessionStatus::Active.as_str().to_string(),
                start_time,
                planned_duration,
                actual_duration: None,
                end_time: None,
                unlock_code: "4821".to_string(),
                created_utc: start_time,
                updated_utc: start_time,
            },
        );
        if let Some(locker) = state.lockers.get_mut(&locker_id) {
            locker.status = LockerStatus::Occupied.as_str().to_string();
        }
        session_id
    }

    /// Persist an extension the way the extend-session handler does.
    pub async fn add_extension(&self, session_id: Uuid, minutes: i32, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        state.extensions.push(SessionExtension {
            extension_id: Uuid::new_v4(),
            session_id,
            minutes,
            created_utc: at,
        });
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.status = SessionStatus::Extended.as_str().to_string();
        }
    }

    pub async fn set_session_status(&self, session_id: Uuid, status: SessionStatus) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.status = status.as_str().to_string();
        }
    }

    pub async fn remove_locker(&self, locker_id: Uuid) {
        self.state.lock().await.lockers.remove(&locker_id);
    }

    pub async fn session(&self, session_id: Uuid) -> Session {
        self.state.lock().await.sessions[&session_id].clone()
    }

    pub async fn locker(&self, locker_id: Uuid) -> Locker {
        self.state.lock().await.lockers[&locker_id].clone()
    }

    pub async fn statistics(&self, date: NaiveDate) -> Option<UsageStatistics> {
        self.state.lock().await.statistics.get(&date).cloned()
    }

    pub fn fail_get_session(&self, session_id: Uuid) {
        self.failing_sessions.lock().unwrap().insert(session_id);
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }
}

fn injected(what: &str) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("injected failure: {}", what))
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(injected("health_check"));
        }
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SessionWithExtensions>, AppError> {
        if self.failing_sessions.lock().unwrap().contains(&session_id) {
            return Err(injected("get_session"));
        }
        let state = self.state.lock().await;
        Ok(state.sessions.get(&session_id).map(|session| SessionWithExtensions {
            session: session.clone(),
            extensions: state
                .extensions
                .iter()
                .filter(|e| e.session_id == session_id)
                .cloned()
                .collect(),
        }))
    }

    async fn get_locker(&self, locker_id: Uuid) -> Result<Option<Locker>, AppError> {
        Ok(self.state.lock().await.lockers.get(&locker_id).cloned())
    }

    async fn list_sessions(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, AppError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(injected("list_sessions"));
        }
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.status().is_some_and(|status| statuses.contains(&status)))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            staged,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    staged: State,
    fail_commit: bool,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock_session(&mut self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        Ok(self.staged.sessions.get(&session_id).cloned())
    }

    async fn lock_locker(&mut self, locker_id: Uuid) -> Result<Option<Locker>, AppError> {
        Ok(self.staged.lockers.get(&locker_id).cloned())
    }

    async fn update_session(
        &mut self,
        session_id: Uuid,
        update: &SessionUpdate,
    ) -> Result<(), AppError> {
        let session = self
            .staged
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Session not found")))?;
        if let Some(status) = update.status {
            session.status = status.as_str().to_string();
        }
        if update.end_time.is_some() {
            session.end_time = update.end_time;
        }
        if update.actual_duration.is_some() {
            session.actual_duration = update.actual_duration;
        }
        Ok(())
    }

    async fn update_locker(
        &mut self,
        locker_id: Uuid,
        update: &LockerUpdate,
    ) -> Result<(), AppError> {
        let locker = self
            .staged
            .lockers
            .get_mut(&locker_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Locker not found")))?;
        if let Some(status) = update.status {
            locker.status = status.as_str().to_string();
        }
        locker.total_usage_hours += update.add_usage_hours;
        Ok(())
    }

    async fn user_completed_between(
        &mut self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        excluding: Uuid,
    ) -> Result<bool, AppError> {
        Ok(self.staged.sessions.values().any(|s| {
            s.user_id == user_id
                && s.session_id != excluding
                && s.status() == Some(SessionStatus::Completed)
                && s.end_time.is_some_and(|end| end >= from && end < to)
        }))
    }

    async fn upsert_daily_statistics(
        &mut self,
        date: NaiveDate,
        delta: &StatisticsDelta,
    ) -> Result<UsageStatistics, AppError> {
        let stats = self
            .staged
            .statistics
            .entry(date)
            .and_modify(|existing| {
                existing.avg_session_time = UsageStatistics::running_average(
                    existing.avg_session_time,
                    existing.total_sessions,
                    delta.session_minutes,
                );
                existing.total_sessions += delta.sessions;
                existing.total_users += delta.new_users;
            })
            .or_insert_with(|| UsageStatistics {
                stat_date: date,
                total_sessions: delta.sessions,
                total_users: delta.new_users,
                avg_session_time: delta.session_minutes,
                locker_utilization: 0.0,
                total_revenue: 0,
                created_utc: base_time(),
                updated_utc: base_time(),
            });
        Ok(stats.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        if self.fail_commit {
            return Err(injected("commit"));
        }
        let mut tx = *self;
        *tx.guard = tx.staged;
        Ok(())
    }
}

/// Store, clock and manager wired together on paused time.
pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<VirtualClock>,
    pub manager: Arc<SessionTimerManager>,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(VirtualClock::starting_at(base_time()));
        let manager = Arc::new(SessionTimerManager::new(store.clone(), clock.clone()));
        Self {
            store,
            clock,
            manager,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// A locker with one ACTIVE session that started at the current time.
    pub async fn running_session(&self, planned_duration: i32) -> (Uuid, Uuid) {
        let locker_id = self.store.insert_locker().await;
        let session_id = self
            .store
            .insert_session(locker_id, self.now(), planned_duration)
            .await;
        (session_id, locker_id)
    }
}
