//! Application startup and lifecycle management.

use crate::config::LockerSessionConfig;
use crate::handlers::{
    clear_session_timer, complete_session, extend_session_timer, get_session_time_remaining,
    health_check, metrics_handler, pending_timers, readiness_check, start_session_timer,
};
use crate::services::{init_metrics, Database, SessionStore, SystemClock};
use crate::timers::SessionTimerManager;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub manager: Arc<SessionTimerManager>,
}

/// HTTP routes: health checks, metrics, timer control and synchronization.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/timers", get(pending_timers))
        .route(
            "/sessions/:session_id/timer",
            post(start_session_timer).delete(clear_session_timer),
        )
        .route("/sessions/:session_id/timer/extend", post(extend_session_timer))
        .route("/sessions/:session_id/complete", post(complete_session))
        .route("/sessions/:session_id/remaining", get(get_session_time_remaining))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect to the store, apply migrations, restore timers and bind the listener.
    pub async fn build(config: LockerSessionConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        let store: Arc<dyn SessionStore> = Arc::new(db);
        let manager = Arc::new(SessionTimerManager::new(
            store.clone(),
            Arc::new(SystemClock),
        ));

        if config.timers.restore_on_startup {
            // A failed listing leaves the service up; running sessions are
            // picked up again on the next restart.
            if let Err(e) = manager.restore_active_session_timers().await {
                tracing::error!(error = %e, "Failed to restore session timers");
            }
        } else {
            tracing::warn!("Session timer restore disabled by configuration");
        }

        let http_addr: SocketAddr = format!("{}:{}", config.common.host, config.common.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid listen address: {}", e)))?;
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Locker session service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state: AppState { store, manager },
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// The timer manager, for request handlers and the shutdown hook.
    pub fn manager(&self) -> Arc<SessionTimerManager> {
        self.state.manager.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "locker-session-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
