//! Alerting System
//!
//! Fire-and-forget alert sounds for drowsiness episodes. Frame loops hold an
//! [`AlertTrigger`]; an [`AlertDispatcher`] drains requests on a bounded
//! queue so a slow or broken audio device never stalls detection.

mod dispatcher;
mod sound;

pub use dispatcher::{AlertConfig, AlertDispatcher, AlertRequest, AlertTrigger};
pub use sound::{AlertSound, Silent, TerminalBell};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Alert errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Could not play alert sound: {0}")]
    Playback(String),
}

/// Sound backend for a configuration
pub fn sound_for(config: &AlertConfig) -> Arc<dyn AlertSound> {
    if config.enabled {
        Arc::new(TerminalBell::new(Duration::from_millis(config.duration_ms)))
    } else {
        Arc::new(Silent)
    }
}
