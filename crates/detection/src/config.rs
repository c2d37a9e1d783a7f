//! Detection configuration

use serde::{Deserialize, Serialize};

use crate::DetectionError;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// EAR below this counts as a closed-eye sample
    pub ear_threshold: f64,

    /// Closed-eye samples in a row before an alert fires
    pub consecutive_frames: u32,

    /// Only every Nth frame is evaluated
    pub frame_skip: u32,

    /// Resolution frames are downscaled to before landmark extraction
    pub process_width: u32,
    pub process_height: u32,

    /// EAR samples kept for running statistics
    pub history_capacity: usize,

    /// Sample used when no face is found (keeps the debounce counter from staying armed)
    pub no_face_ear: f64,

    pub mesh: MeshConfig,
    pub cascade: CascadeConfig,
    pub overlay: OverlayConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.25,
            consecutive_frames: 20,
            frame_skip: 2,
            process_width: 320,
            process_height: 240,
            history_capacity: ring_buffer::DEFAULT_CAPACITY,
            no_face_ear: 0.30,
            mesh: MeshConfig::default(),
            cascade: CascadeConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Fires sooner (higher threshold, shorter run)
    pub fn sensitive() -> Self {
        Self {
            ear_threshold: 0.27,
            consecutive_frames: 15,
            ..Default::default()
        }
    }

    /// Fires later (lower threshold, longer run)
    pub fn tolerant() -> Self {
        Self {
            ear_threshold: 0.22,
            consecutive_frames: 30,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(self.ear_threshold > 0.0 && self.ear_threshold < 1.0) {
            return Err(DetectionError::Config(format!(
                "ear_threshold must be in (0, 1), got {}",
                self.ear_threshold
            )));
        }
        if self.consecutive_frames == 0 {
            return Err(DetectionError::Config("consecutive_frames must be at least 1".into()));
        }
        if self.frame_skip == 0 {
            return Err(DetectionError::Config("frame_skip must be at least 1".into()));
        }
        if self.process_width == 0 || self.process_height == 0 {
            return Err(DetectionError::Config("processing resolution must be non-zero".into()));
        }
        Ok(())
    }
}

/// Face mesh backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// ONNX face landmark model; the mesh strategy is unavailable without it
    pub model_path: Option<String>,
    /// Square model input edge in pixels
    pub input_size: u32,
    /// Minimum presence score when searching the whole frame
    pub detection_confidence: f32,
    /// Minimum presence score when following the previous face
    pub tracking_confidence: f32,
    pub intra_threads: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 192,
            detection_confidence: 0.5,
            tracking_confidence: 0.5,
            intra_threads: 1,
        }
    }
}

/// Haar cascade fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub face_model: String,
    pub eye_model: String,
    pub face_scale_factor: f64,
    pub face_min_neighbors: i32,
    pub eye_scale_factor: f64,
    pub eye_min_neighbors: i32,
    /// Fraction of the face box (from the top) searched for eyes
    pub eye_region: f32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            face_model: "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml".into(),
            eye_model: "/usr/share/opencv4/haarcascades/haarcascade_eye.xml".into(),
            face_scale_factor: 1.2,
            face_min_neighbors: 4,
            eye_scale_factor: 1.1,
            eye_min_neighbors: 3,
            eye_region: 0.6,
        }
    }
}

/// Annotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// TTF/OTF font for text
    pub font_path: Option<String>,
    /// Look for a system font when `font_path` is unset; the built-in
    /// bitmap font is the last resort
    pub system_fonts: bool,
    /// Draw eye landmarks on the output frame
    pub show_landmarks: bool,
    pub text_scale: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            system_fonts: true,
            show_landmarks: true,
            text_scale: 20.0,
        }
    }
}
