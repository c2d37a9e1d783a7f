//! Session History Routes

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use storage::{SessionId, SessionRecord};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

/// Sessions shown on the dashboard
const RECENT_SESSIONS: usize = 5;

/// One row of the history list
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub session_start: DateTime<Utc>,
    pub session_end: Option<DateTime<Utc>>,
    pub alert_count: u32,
    /// HH:MM:SS, "00:00:00" while running
    pub duration: String,
    pub active: bool,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            session_start: record.session_start,
            session_end: record.session_end,
            alert_count: record.alert_count,
            duration: record.duration_string(),
            active: record.is_active(),
        }
    }
}

/// Full report with every alert time
#[derive(Debug, Serialize)]
pub struct SessionReport {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub drowsy_times: Vec<String>,
}

impl From<&SessionRecord> for SessionReport {
    fn from(record: &SessionRecord) -> Self {
        Self {
            summary: record.into(),
            drowsy_times: record.alert_timestamps(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub data: Vec<SessionSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub total_sessions: usize,
    pub total_alerts: u64,
    pub avg_alerts: f64,
    pub recent_sessions: Vec<SessionSummary>,
    pub monitoring_active: bool,
}

/// Newest first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state.store.list_sessions(&user)?;
    let data: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();
    Ok(Json(SessionListResponse {
        count: data.len(),
        data,
    }))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionReport>, ApiError> {
    let record = state.store.get_session(&user, id)?;
    Ok(Json(SessionReport::from(&record)))
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<DashboardResponse>, ApiError> {
    let sessions = state.store.list_sessions(&user)?;
    let summary = storage::UserSummary::from_sessions(&sessions);
    Ok(Json(DashboardResponse {
        total_sessions: summary.total_sessions,
        total_alerts: summary.total_alerts,
        avg_alerts: summary.average_alerts,
        recent_sessions: sessions.iter().take(RECENT_SESSIONS).map(SessionSummary::from).collect(),
        monitoring_active: state.coordinator.is_active(&user),
    }))
}
