//! API error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use session::SessionError;
use storage::StorageError;
use tracing::error;

/// JSON error body: `{"status": "error", "code": ..., "message": ...}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    pub fn unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error",
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(id) => Self::not_found("SESSION_NOT_FOUND", format!("Session {} not found", id)),
            StorageError::SessionClosed(id) => {
                Self::conflict("SESSION_CLOSED", format!("Session {} already ended", id))
            }
            StorageError::DatabaseError(msg) => {
                error!(error = %msg, "Storage failure");
                Self::internal("Storage failure")
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Camera(e) => Self::unavailable("CAMERA_UNAVAILABLE", e.to_string()),
            SessionError::Detection(e) => Self::unavailable("DETECTOR_UNAVAILABLE", e.to_string()),
            SessionError::Storage(e) => e.into(),
            other => {
                error!(error = %other, "Session coordinator failure");
                Self::internal("Session coordinator failure")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::CameraError;

    #[test]
    fn test_camera_failure_is_503() {
        let err: ApiError = SessionError::Camera(CameraError::Open("no device".into())).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code, "CAMERA_UNAVAILABLE");
    }

    #[test]
    fn test_missing_session_is_404() {
        let err: ApiError = SessionError::Storage(StorageError::NotFound(7)).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
