//! Alert Routes

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use session::AlertOutcome;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub status: &'static str,
    pub alert_count: u32,
}

/// Log a drowsiness alert raised by the client.
///
/// Any request body is ignored; the server stamps the time. Without an
/// active session this is a 409 with `{"status": "error"}`.
pub async fn record_alert(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<AlertResponse>, ApiError> {
    match state.coordinator.record_alert(&user)? {
        AlertOutcome::Recorded { alert_count } => Ok(Json(AlertResponse {
            status: "success",
            alert_count,
        })),
        AlertOutcome::Inactive => Err(ApiError::conflict("NO_ACTIVE_SESSION", "No active monitoring session")),
    }
}
