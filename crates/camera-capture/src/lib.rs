//! Camera Capture Library for Drowsiness Monitoring
//!
//! Provides the frame type shared by the detection pipeline and the
//! sources that produce it:
//! - Webcam / video file capture through OpenCV (`opencv` feature)
//! - Directory of still images (replay without a camera)
//! - In-memory replay for tests
//!
//! JPEG encoding for the MJPEG stream lives on [`VideoFrame`].

pub mod frame;
#[cfg(feature = "opencv")]
pub mod webcam;
pub mod source;

pub use frame::VideoFrame;
pub use source::{FrameSource, ImageSequenceSource, ReplaySource};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("JPEG encoding failed: {0}")]
    Encode(String),

    #[error("Camera backend not available: {0}")]
    Unsupported(String),
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index ("0"), video file, or a directory of still images
    pub device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// Driver-side buffer length (1 keeps latency low)
    pub buffer_size: u32,
    /// Mirror frames horizontally before processing
    pub mirror: bool,
    /// JPEG quality for streamed frames
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            buffer_size: 1,
            mirror: true,
            jpeg_quality: 80,
        }
    }
}

impl CameraConfig {
    /// Interval between frames at the target rate
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Open the configured device.
///
/// A directory is replayed as an image sequence; anything else goes to
/// OpenCV. There is no retry: a camera that cannot be opened is reported
/// to the caller.
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    if Path::new(&config.device).is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(&config.device)?));
    }

    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(webcam::OpenCvCamera::open(config)?))
    }

    #[cfg(not(feature = "opencv"))]
    {
        Err(CameraError::Unsupported(format!(
            "cannot open {}: built without the `opencv` feature",
            config.device
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CameraConfig::default();
        assert_eq!((config.width, config.height, config.fps), (640, 480, 30));
        assert!((config.frame_interval().as_secs_f64() - 0.0333).abs() < 0.001);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_open_camera_without_backend_fails() {
        let err = open_camera(&CameraConfig::default()).err().unwrap();
        assert!(matches!(err, CameraError::Unsupported(_)));
    }
}
