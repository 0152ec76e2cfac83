//! PostgreSQL store for locker-session-service.

use crate::models::{
    Locker, LockerUpdate, Session, SessionExtension, SessionStatus, SessionUpdate,
    SessionWithExtensions, StatisticsDelta, UsageStatistics,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{SessionStore, StoreTransaction};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "session_id, user_id, locker_id, status, start_time, planned_duration, actual_duration, end_time, unlock_code, created_utc, updated_utc";

const LOCKER_COLUMNS: &str =
    "locker_id, locker_number, status, total_usage_hours, total_usage_count, created_utc, updated_utc";

const STATISTICS_COLUMNS: &str = "stat_date, total_sessions, total_users, avg_session_time, locker_utilization, total_revenue, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "locker-session-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

fn status_strings(statuses: &[SessionStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl SessionStore for Database {
    async fn health_check(&self) -> Result<(), AppError> {
        self.ping().await
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn get_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SessionWithExtensions>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_session"])
            .start_timer();

        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get session: {}", e)))?;

        let Some(session) = session else {
            timer.observe_duration();
            return Ok(None);
        };

        let extensions = sqlx::query_as::<_, SessionExtension>(
            r#"
            SELECT extension_id, session_id, minutes, created_utc
            FROM session_extensions
            WHERE session_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get session extensions: {}", e))
        })?;

        timer.observe_duration();

        Ok(Some(SessionWithExtensions {
            session,
            extensions,
        }))
    }

    #[instrument(skip(self), fields(locker_id = %locker_id))]
    async fn get_locker(&self, locker_id: Uuid) -> Result<Option<Locker>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_locker"])
            .start_timer();

        let locker = sqlx::query_as::<_, Locker>(&format!(
            "SELECT {LOCKER_COLUMNS} FROM lockers WHERE locker_id = $1"
        ))
        .bind(locker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get locker: {}", e)))?;

        timer.observe_duration();

        Ok(locker)
    }

    #[instrument(skip(self))]
    async fn list_sessions(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_sessions"])
            .start_timer();

        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ANY($1) ORDER BY start_time"
        ))
        .bind(status_strings(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list sessions: {}", e)))?;

        timer.observe_duration();

        Ok(sessions)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError> {
        let tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

/// A PostgreSQL transaction. Rolled back by sqlx when dropped uncommitted.
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn lock_session(&mut self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_session"])
            .start_timer();

        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock session: {}", e)))?;

        timer.observe_duration();

        Ok(session)
    }

    #[instrument(skip(self), fields(locker_id = %locker_id))]
    async fn lock_locker(&mut self, locker_id: Uuid) -> Result<Option<Locker>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_locker"])
            .start_timer();

        let locker = sqlx::query_as::<_, Locker>(&format!(
            "SELECT {LOCKER_COLUMNS} FROM lockers WHERE locker_id = $1 FOR UPDATE"
        ))
        .bind(locker_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock locker: {}", e)))?;

        timer.observe_duration();

        Ok(locker)
    }

    #[instrument(skip(self, update), fields(session_id = %session_id))]
    async fn update_session(
        &mut self,
        session_id: Uuid,
        update: &SessionUpdate,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_session"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = COALESCE($2, status),
                end_time = COALESCE($3, end_time),
                actual_duration = COALESCE($4, actual_duration),
                updated_utc = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.end_time)
        .bind(update.actual_duration)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update session: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Session {} not found",
                session_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, update), fields(locker_id = %locker_id))]
    async fn update_locker(
        &mut self,
        locker_id: Uuid,
        update: &LockerUpdate,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_locker"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE lockers
            SET status = COALESCE($2, status),
                total_usage_hours = total_usage_hours + $3,
                updated_utc = NOW()
            WHERE locker_id = $1
            "#,
        )
        .bind(locker_id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.add_usage_hours)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update locker: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Locker {} not found",
                locker_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn user_completed_between(
        &mut self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        excluding: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["user_completed_between"])
            .start_timer();

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sessions
                WHERE user_id = $1
                  AND status = 'COMPLETED'
                  AND end_time >= $2 AND end_time < $3
                  AND session_id <> $4
            )
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .bind(excluding)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check user sessions: {}", e))
        })?;

        timer.observe_duration();

        Ok(exists)
    }

    #[instrument(skip(self, delta), fields(stat_date = %date))]
    async fn upsert_daily_statistics(
        &mut self,
        date: NaiveDate,
        delta: &StatisticsDelta,
    ) -> Result<UsageStatistics, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_daily_statistics"])
            .start_timer();

        // Same running mean as UsageStatistics::running_average.
        let stats = sqlx::query_as::<_, UsageStatistics>(&format!(
            r#"
            INSERT INTO usage_statistics (stat_date, total_sessions, total_users, avg_session_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (stat_date) DO UPDATE
            SET total_sessions = usage_statistics.total_sessions + EXCLUDED.total_sessions,
                total_users = usage_statistics.total_users + EXCLUDED.total_users,
                avg_session_time = ROUND(
                    usage_statistics.avg_session_time
                    + (EXCLUDED.avg_session_time - usage_statistics.avg_session_time)::numeric
                      / (usage_statistics.total_sessions + 1)
                )::integer,
                updated_utc = NOW()
            RETURNING {STATISTICS_COLUMNS}
            "#
        ))
        .bind(date)
        .bind(delta.sessions)
        .bind(delta.new_users)
        .bind(delta.session_minutes)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to upsert usage statistics: {}", e))
        })?;

        timer.observe_duration();

        Ok(stats)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })
    }
}
