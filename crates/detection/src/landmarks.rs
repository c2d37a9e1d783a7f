//! Eye landmark types and the extractor seam

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};

use crate::DetectionError;

/// Face mesh indices for the left eye, in EAR order
/// `[outer, upper1, upper2, inner, lower1, lower2]`.
///
/// These are calibration constants: the vertical pairs EAR uses are
/// (1, 5) and (2, 4), whatever the anatomical labels say.
pub const LEFT_EYE_INDICES: [usize; 6] = [33, 160, 158, 133, 153, 144];

/// Face mesh indices for the right eye, same ordering as [`LEFT_EYE_INDICES`]
pub const RIGHT_EYE_INDICES: [usize; 6] = [362, 385, 387, 263, 373, 380];

/// Landmarks produced by a full face mesh
pub const MESH_LANDMARKS: usize = 468;

/// 2D pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Point {
        Point::new(self.x * sx, self.y * sy)
    }
}

/// Axis-aligned pixel region (face or eye box)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Same box shifted by an offset
    pub fn offset(&self, dx: u32, dy: u32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Clipped to a `width` x `height` image; `None` if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        (w > 0 && h > 0).then(|| Rect::new(self.x, self.y, w, h))
    }
}

/// Six ordered points outlining one eye
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyePoints(pub [Point; 6]);

impl EyePoints {
    pub fn points(&self) -> &[Point; 6] {
        &self.0
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> EyePoints {
        EyePoints(self.0.map(|p| p.scaled(sx, sy)))
    }
}

/// Both eyes of one face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyePair {
    pub left: EyePoints,
    pub right: EyePoints,
}

impl EyePair {
    pub fn scaled(&self, sx: f64, sy: f64) -> EyePair {
        EyePair {
            left: self.left.scaled(sx, sy),
            right: self.right.scaled(sx, sy),
        }
    }
}

/// What an extractor found in a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EyeReading {
    /// Precise geometry; EAR is computed from it
    Landmarks(EyePair),
    /// Coarse strategies report an EAR estimate directly
    Estimated(f64),
}

/// Turns a frame into eye geometry.
///
/// Implementations may draw their own annotations (face boxes, landmark
/// dots) onto `frame`. `Ok(None)` means no face was found, which is not an
/// error.
pub trait LandmarkExtractor: Send {
    fn extract(&mut self, frame: &mut VideoFrame) -> Result<Option<EyeReading>, DetectionError>;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Drop any tracking state carried between frames
    fn reset(&mut self) {}
}

impl LandmarkExtractor for Box<dyn LandmarkExtractor> {
    fn extract(&mut self, frame: &mut VideoFrame) -> Result<Option<EyeReading>, DetectionError> {
        (**self).extract(frame)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Pick both eyes out of a normalized face mesh and convert to pixels.
///
/// Returns `None` when the mesh is too short to contain every eye index.
pub fn eyes_from_mesh(landmarks: &[(f32, f32)], width: u32, height: u32) -> Option<EyePair> {
    let pick = |indices: &[usize; 6]| -> Option<EyePoints> {
        let mut points = [Point::default(); 6];
        for (slot, &index) in points.iter_mut().zip(indices.iter()) {
            let (nx, ny) = *landmarks.get(index)?;
            // Integer pixel coordinates, as a drawing backend would see them
            *slot = Point::new((nx * width as f32).trunc() as f64, (ny * height as f32).trunc() as f64);
        }
        Some(EyePoints(points))
    };

    Some(EyePair {
        left: pick(&LEFT_EYE_INDICES)?,
        right: pick(&RIGHT_EYE_INDICES)?,
    })
}
