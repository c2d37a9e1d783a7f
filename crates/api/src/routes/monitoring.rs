//! Monitoring Start/Stop Routes

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use storage::SessionId;
use tracing::info;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::routes::sessions::SessionReport;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub status: &'static str,
    pub session_id: SessionId,
    pub session_start: DateTime<Utc>,
    /// Session that was still running and got ended
    pub replaced_session_id: Option<SessionId>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopResponse {
    Ended { session: SessionReport },
    Inactive,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub status: &'static str,
    pub ended_session_id: Option<SessionId>,
}

/// Open the camera and start a session (ends any running one first)
pub async fn start(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<StartResponse>, ApiError> {
    let started = state.coordinator.start_session(&user).await?;
    Ok(Json(StartResponse {
        status: "started",
        session_id: started.session_id,
        session_start: started.session_start,
        replaced_session_id: started.replaced.map(|r| r.id),
    }))
}

pub async fn stop(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<StopResponse>, ApiError> {
    let response = match state.coordinator.stop_session(&user).await? {
        Some(record) => StopResponse::Ended {
            session: SessionReport::from(&record),
        },
        None => StopResponse::Inactive,
    };
    Ok(Json(response))
}

/// Ends the active session and frees the user's detector; the identity
/// itself is managed upstream
pub async fn logout(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<LogoutResponse>, ApiError> {
    let ended = state.coordinator.release_session(&user).await?;
    info!(user = %user, ended = ended.is_some(), "User logged out");
    Ok(Json(LogoutResponse {
        status: "logged_out",
        ended_session_id: ended.map(|r| r.id),
    }))
}
