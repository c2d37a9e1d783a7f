//! Drowsiness Detection
//!
//! Per-frame eye-closure analysis:
//! - Eye landmark extraction (face mesh, or Haar cascades as a fallback)
//! - Eye Aspect Ratio scoring
//! - Threshold + run-length debounce that fires once per drowsy episode
//! - Frame annotation and running statistics

pub mod cascade;
pub mod config;
pub mod ear;
pub mod glyphs;
#[cfg(feature = "opencv")]
pub mod haar;
pub mod landmarks;
pub mod mesh;
pub mod overlay;
pub mod pipeline;
pub mod state;
pub mod stats;

pub use cascade::{CascadeExtractor, RegionDetector};
pub use config::{CascadeConfig, DetectionConfig, MeshConfig, OverlayConfig};
pub use ear::{average_ear, eye_aspect_ratio};
pub use landmarks::{EyePair, EyePoints, EyeReading, LandmarkExtractor, Point, Rect};
pub use mesh::{FaceMeshBackend, MeshExtractor, OrtFaceMesh};
pub use pipeline::{DetectionObserver, DrowsinessCallback, FramePipeline, ProcessedFrame};
pub use state::{DetectionState, DrowsinessEvent, DrowsinessTracker, Phase};
pub use stats::DetectionStatistics;

use thiserror::Error;
use tracing::warn;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Font loading failed: {0}")]
    Font(String),

    #[error("No landmark backend available: configure a face mesh model or build with the `opencv` feature")]
    NoBackend,
}

/// Pick the best available landmark extractor.
///
/// The face mesh model is preferred; if it is not configured or fails to
/// load, Haar cascades are used when built with OpenCV.
pub fn build_extractor(config: &DetectionConfig) -> Result<Box<dyn LandmarkExtractor>, DetectionError> {
    match &config.mesh.model_path {
        Some(path) => match OrtFaceMesh::load(path, &config.mesh) {
            Ok(backend) => return Ok(Box::new(MeshExtractor::new(backend, &config.mesh))),
            Err(e) => warn!(error = %e, "Face mesh unavailable, falling back to cascades"),
        },
        None => warn!("No face mesh model configured, falling back to cascades"),
    }

    cascade_extractor(&config.cascade)
}

#[cfg(feature = "opencv")]
fn cascade_extractor(config: &CascadeConfig) -> Result<Box<dyn LandmarkExtractor>, DetectionError> {
    let faces = haar::HaarCascade::load(&config.face_model, config.face_scale_factor, config.face_min_neighbors)?;
    let eyes = haar::HaarCascade::load(&config.eye_model, config.eye_scale_factor, config.eye_min_neighbors)?;
    Ok(Box::new(CascadeExtractor::new(faces, eyes, config)))
}

#[cfg(not(feature = "opencv"))]
fn cascade_extractor(_config: &CascadeConfig) -> Result<Box<dyn LandmarkExtractor>, DetectionError> {
    Err(DetectionError::NoBackend)
}
