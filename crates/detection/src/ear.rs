//! Eye Aspect Ratio

use crate::landmarks::{EyePair, EyePoints};

/// Horizontal spans at or below this are treated as degenerate
const MIN_EYE_WIDTH: f64 = 1e-9;

/// `(|p1 - p5| + |p2 - p4|) / (2 |p0 - p3|)`
///
/// Returns `None` for degenerate geometry (zero eye width) so the caller can
/// fall back to a previous sample.
pub fn eye_aspect_ratio(eye: &EyePoints) -> Option<f64> {
    let p = eye.points();
    let horizontal = p[0].distance(&p[3]);
    if !horizontal.is_finite() || horizontal <= MIN_EYE_WIDTH {
        return None;
    }
    let vertical = p[1].distance(&p[5]) + p[2].distance(&p[4]);
    let ear = vertical / (2.0 * horizontal);
    ear.is_finite().then_some(ear)
}

/// Mean EAR of both eyes; invalid if either eye is
pub fn average_ear(eyes: &EyePair) -> Option<f64> {
    let left = eye_aspect_ratio(&eyes.left)?;
    let right = eye_aspect_ratio(&eyes.right)?;
    Some((left + right) / 2.0)
}
