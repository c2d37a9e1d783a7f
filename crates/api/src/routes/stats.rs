//! Live Session Stats Route

use axum::extract::State;
use axum::Json;
use detection::DetectionStatistics;
use serde::Serialize;
use session::LiveStats;
use std::sync::Arc;
use storage::{format_duration, SessionId};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::routes::local_time_of_day;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatsResponse {
    Active {
        session_id: SessionId,
        alert_count: u32,
        /// Elapsed time, HH:MM:SS
        duration: String,
        /// Start time of day, server local time
        session_start: String,
        detection: DetectionStatistics,
    },
    Inactive,
}

pub async fn session_stats(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<SessionStatsResponse>, ApiError> {
    let response = match state.coordinator.live_stats(&user)? {
        LiveStats::Active(stats) => SessionStatsResponse::Active {
            session_id: stats.session_id,
            alert_count: stats.alert_count,
            duration: format_duration(stats.duration),
            session_start: local_time_of_day(stats.session_start),
            detection: stats.detection,
        },
        LiveStats::Inactive => SessionStatsResponse::Inactive,
    };
    Ok(Json(response))
}
