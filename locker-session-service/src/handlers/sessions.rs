//! Timer control and synchronization endpoints.
//!
//! Called by the session handlers once a session or extension is persisted,
//! and by clients resynchronising their countdown.

use crate::startup::AppState;
use crate::timers::{CompletionOutcome, TimerOutcome};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct TimeRemainingResponse {
    pub session_id: Uuid,
    pub remaining_minutes: i64,
}

/// Lets a client resynchronise its countdown with the server.
pub async fn get_session_time_remaining(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let remaining_minutes = state.manager.get_session_time_remaining(session_id).await?;
    Ok(Json(TimeRemainingResponse {
        session_id,
        remaining_minutes,
    }))
}

#[derive(Debug, Serialize)]
pub struct TimerResponse {
    pub session_id: Uuid,
    pub timer: TimerOutcome,
}

#[derive(Debug, Serialize)]
pub struct ClearTimerResponse {
    pub session_id: Uuid,
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub session_id: Uuid,
    pub completion: CompletionOutcome,
}

/// Arm the completion timer for a newly created session.
pub async fn start_session_timer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let timer = state.manager.start_session_timer(session_id).await?;
    Ok(Json(TimerResponse { session_id, timer }))
}

/// Re-arm after an extension has been committed.
pub async fn extend_session_timer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let timer = state.manager.extend_session_timer(session_id).await?;
    Ok(Json(TimerResponse { session_id, timer }))
}

/// Drop the timer of a session ended elsewhere (interruption, emergency access).
pub async fn clear_session_timer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let cleared = state.manager.clear_session_timer(session_id);
    Json(ClearTimerResponse {
        session_id,
        cleared,
    })
}

pub async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let completion = state.manager.complete_session(session_id).await?;
    Ok(Json(CompletionResponse {
        session_id,
        completion,
    }))
}

pub async fn pending_timers(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "pending": state.manager.pending_timers() }))
}
