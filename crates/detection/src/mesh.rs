//! Face mesh landmark strategy

use camera_capture::VideoFrame;
use image::{imageops, RgbImage};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::{debug, info};

use crate::config::MeshConfig;
use crate::landmarks::{eyes_from_mesh, EyeReading, LandmarkExtractor, Rect, MESH_LANDMARKS};
use crate::overlay::{draw_eyes, GREEN};
use crate::DetectionError;

/// Padding added around the previous face when tracking
const ROI_PADDING: f32 = 0.25;
/// Smallest crop worth running the model on
const MIN_ROI: u32 = 8;

/// Raw model output for one crop
#[derive(Debug, Clone, Default)]
pub struct FaceMesh {
    /// Landmarks normalized to the crop (0..1)
    pub landmarks: Vec<(f32, f32)>,
    /// Face presence score in 0..1
    pub score: f32,
}

/// Anything that can turn an RGB crop into a face mesh
pub trait FaceMeshBackend: Send {
    fn infer(&mut self, image: &RgbImage) -> Result<FaceMesh, DetectionError>;
}

/// Runs a face mesh backend on the whole frame, then follows the face.
///
/// Detection searches the full frame with `detection_confidence`; once a
/// face is found the next frame only looks at a padded box around it and
/// accepts it with `tracking_confidence`, falling back to a full search
/// when tracking loses the face.
pub struct MeshExtractor<B> {
    backend: B,
    detection_confidence: f32,
    tracking_confidence: f32,
    roi: Option<Rect>,
}

impl<B: FaceMeshBackend> MeshExtractor<B> {
    pub fn new(backend: B, config: &MeshConfig) -> Self {
        Self {
            backend,
            detection_confidence: config.detection_confidence,
            tracking_confidence: config.tracking_confidence,
            roi: None,
        }
    }

    /// Box the next frame will be searched in, if tracking
    pub fn tracked_region(&self) -> Option<Rect> {
        self.roi
    }

    /// Landmarks normalized to the full frame, if a face passes `min_score`
    fn run(
        &mut self,
        frame: &VideoFrame,
        roi: Rect,
        min_score: f32,
    ) -> Result<Option<Vec<(f32, f32)>>, DetectionError> {
        let crop = frame
            .crop(roi.x, roi.y, roi.width, roi.height)
            .ok_or_else(|| DetectionError::ImageProcessing(format!("crop {:?} outside frame", roi)))?;
        let mesh = self.backend.infer(&crop.to_rgb_image())?;

        if mesh.score < min_score || mesh.landmarks.len() < MESH_LANDMARKS {
            return Ok(None);
        }

        let (fw, fh) = (frame.width as f32, frame.height as f32);
        Ok(Some(
            mesh.landmarks
                .iter()
                .map(|&(x, y)| {
                    (
                        (roi.x as f32 + x * roi.width as f32) / fw,
                        (roi.y as f32 + y * roi.height as f32) / fh,
                    )
                })
                .collect(),
        ))
    }
}

impl<B: FaceMeshBackend> LandmarkExtractor for MeshExtractor<B> {
    fn extract(&mut self, frame: &mut VideoFrame) -> Result<Option<EyeReading>, DetectionError> {
        let full = Rect::new(0, 0, frame.width, frame.height);

        let landmarks = match self.roi.take() {
            Some(roi) => match self.run(frame, roi, self.tracking_confidence)? {
                Some(found) => Some(found),
                None => {
                    debug!("Lost tracked face, searching full frame");
                    self.run(frame, full, self.detection_confidence)?
                }
            },
            None => self.run(frame, full, self.detection_confidence)?,
        };

        let Some(landmarks) = landmarks else {
            return Ok(None);
        };

        self.roi = padded_square(&landmarks, frame.width, frame.height);
        let Some(eyes) = eyes_from_mesh(&landmarks, frame.width, frame.height) else {
            return Ok(None);
        };
        draw_eyes(frame, &eyes, GREEN);
        Ok(Some(EyeReading::Landmarks(eyes)))
    }

    fn name(&self) -> &'static str {
        "face-mesh"
    }

    fn reset(&mut self) {
        self.roi = None;
    }
}

/// Square box around normalized landmarks, padded and clamped to the frame
pub fn padded_square(landmarks: &[(f32, f32)], width: u32, height: u32) -> Option<Rect> {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for &(x, y) in landmarks {
        min_x = min_x.min(x * width as f32);
        min_y = min_y.min(y * height as f32);
        max_x = max_x.max(x * width as f32);
        max_y = max_y.max(y * height as f32);
    }
    if landmarks.is_empty() || max_x <= min_x || max_y <= min_y {
        return None;
    }

    let size = (max_x - min_x).max(max_y - min_y) * (1.0 + ROI_PADDING);
    let cx = (min_x + max_x) / 2.0;
    let cy = (min_y + max_y) / 2.0;

    let x0 = (cx - size / 2.0).max(0.0);
    let y0 = (cy - size / 2.0).max(0.0);
    let x1 = (cx + size / 2.0).min(width as f32);
    let y1 = (cy + size / 2.0).min(height as f32);

    let rect = Rect::new(
        x0.round() as u32,
        y0.round() as u32,
        (x1 - x0).round() as u32,
        (y1 - y0).round() as u32,
    );
    let rect = rect.clamp_to(width, height)?;
    (rect.width >= MIN_ROI && rect.height >= MIN_ROI).then_some(rect)
}

/// Flat `[x, y, z, x, y, z, ...]` model output to normalized (x, y) pairs.
///
/// Models either emit coordinates in input pixels or already normalized;
/// anything past 2.0 is taken as pixels.
pub fn decode_landmarks(values: &[f32], input_size: u32) -> Vec<(f32, f32)> {
    let in_pixels = values.iter().any(|v| v.abs() > 2.0);
    let scale = if in_pixels { input_size as f32 } else { 1.0 };
    values.chunks_exact(3).map(|c| (c[0] / scale, c[1] / scale)).collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// ONNX Runtime face landmark model (468 points + presence logit)
pub struct OrtFaceMesh {
    session: Session,
    input_size: u32,
    landmark_output: String,
    score_output: Option<String>,
}

impl OrtFaceMesh {
    pub fn load(path: &str, config: &MeshConfig) -> Result<Self, DetectionError> {
        info!("Loading face mesh model from {}", path);
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(config.intra_threads.max(1)))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| DetectionError::ModelLoad(format!("{}: {}", path, e)))?;

        let mut names = session.outputs.iter().map(|o| o.name.clone());
        let landmark_output = names
            .next()
            .ok_or_else(|| DetectionError::ModelLoad(format!("{}: model has no outputs", path)))?;
        let score_output = names.next();

        Ok(Self {
            session,
            input_size: config.input_size.max(1),
            landmark_output,
            score_output,
        })
    }
}

impl FaceMeshBackend for OrtFaceMesh {
    fn infer(&mut self, image: &RgbImage) -> Result<FaceMesh, DetectionError> {
        let inference = |e: ort::Error| DetectionError::Inference(e.to_string());
        let size = self.input_size;
        let resized = imageops::resize(image, size, size, imageops::FilterType::Triangle);

        // 1x3xSxS in [-1, 1]
        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 127.5) - 1.0;
            }
        }

        let outputs = self
            .session
            .run(ort::inputs![input].map_err(inference)?)
            .map_err(inference)?;

        let raw = outputs[self.landmark_output.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(inference)?;
        let values: Vec<f32> = raw.iter().copied().collect();

        let score = match &self.score_output {
            Some(name) => outputs[name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(inference)?
                .iter()
                .next()
                .copied()
                .map(sigmoid)
                .unwrap_or(0.0),
            None => 1.0,
        };

        Ok(FaceMesh {
            landmarks: decode_landmarks(&values, size),
            score,
        })
    }
}
