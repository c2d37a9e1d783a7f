//! Monitoring Sessions
//!
//! Ties a user's camera, detection pipeline and session log together. The
//! [`SessionCoordinator`] is the only way request handlers reach a running
//! pipeline: they read statistics and frames it publishes and never touch
//! pipeline state directly.

mod coordinator;
mod factory;
mod worker;

pub use coordinator::{SessionCoordinator, WorkerSettings};
pub use factory::{CameraOpener, ConfiguredCamera, DetectorFactory, PipelineFactory};

use camera_capture::CameraError;
use chrono::{DateTime, Utc};
use detection::{DetectionError, DetectionStatistics};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use storage::{SessionId, SessionRecord, StorageError};
use thiserror::Error;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Camera unavailable: {0}")]
    Camera(#[from] CameraError),

    #[error("Detection setup failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result of a successful start
#[derive(Debug, Clone)]
pub struct SessionStarted {
    pub session_id: SessionId,
    pub session_start: DateTime<Utc>,
    /// Session that was still running and got ended first
    pub replaced: Option<SessionRecord>,
}

/// Result of logging an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlertOutcome {
    Recorded { alert_count: u32 },
    Inactive,
}

/// Live view of an active session
#[derive(Debug, Clone, Copy)]
pub struct ActiveStats {
    pub session_id: SessionId,
    pub alert_count: u32,
    pub session_start: DateTime<Utc>,
    pub duration: Duration,
    pub detection: DetectionStatistics,
}

#[derive(Debug, Clone, Copy)]
pub enum LiveStats {
    Active(ActiveStats),
    Inactive,
}

/// One annotated, JPEG-encoded frame
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub jpeg: Arc<Vec<u8>>,
    pub sequence: u32,
    pub ear: f64,
    pub is_drowsy: bool,
}
