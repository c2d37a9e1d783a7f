//! Coarse face/eye box strategy
//!
//! Used when no face mesh model is available. Box detectors cannot measure
//! lid geometry, so the extractor reports an EAR estimate from how many eyes
//! it sees instead of going through [`crate::ear`].

use camera_capture::VideoFrame;
use image::{imageops, GrayImage};
use tracing::trace;

use crate::config::CascadeConfig;
use crate::landmarks::{EyeReading, LandmarkExtractor, Rect};
use crate::overlay::{draw_region, BLUE, GREEN};
use crate::DetectionError;

/// Estimate when two or more eyes are visible
pub const EAR_EYES_OPEN: f64 = 0.30;
/// Estimate when exactly one eye is visible
pub const EAR_EYES_PARTIAL: f64 = 0.20;
/// Estimate when no eyes are visible
pub const EAR_EYES_CLOSED: f64 = 0.15;

/// Finds object boxes in a grayscale image
pub trait RegionDetector: Send {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<Rect>, DetectionError>;
}

/// Eye count to EAR estimate
pub fn estimate_ear(eye_count: usize) -> f64 {
    match eye_count {
        0 => EAR_EYES_CLOSED,
        1 => EAR_EYES_PARTIAL,
        _ => EAR_EYES_OPEN,
    }
}

/// Face boxes, then eye boxes inside the upper part of each face
pub struct CascadeExtractor<F, E> {
    faces: F,
    eyes: E,
    eye_region: f32,
}

impl<F: RegionDetector, E: RegionDetector> CascadeExtractor<F, E> {
    pub fn new(faces: F, eyes: E, config: &CascadeConfig) -> Self {
        Self {
            faces,
            eyes,
            eye_region: config.eye_region.clamp(0.1, 1.0),
        }
    }
}

impl<F: RegionDetector, E: RegionDetector> LandmarkExtractor for CascadeExtractor<F, E> {
    fn extract(&mut self, frame: &mut VideoFrame) -> Result<Option<EyeReading>, DetectionError> {
        let gray = frame.to_grayscale();
        let faces: Vec<Rect> = self
            .faces
            .detect(&gray)?
            .into_iter()
            .filter_map(|f| f.clamp_to(gray.width(), gray.height()))
            .collect();

        let mut eye_count = 0;
        let mut boxes = Vec::with_capacity(faces.len() * 3);
        for face in &faces {
            boxes.push((*face, BLUE));

            let upper = ((face.height as f32 * self.eye_region) as u32).max(1);
            let roi = imageops::crop_imm(&gray, face.x, face.y, face.width, upper).to_image();
            let eyes = self.eyes.detect(&roi)?;
            eye_count = eyes.len();
            boxes.extend(eyes.into_iter().map(|eye| (eye.offset(face.x, face.y), GREEN)));
        }

        trace!(faces = faces.len(), eyes = eye_count, "Cascade detection");
        frame.with_image_mut(|img| {
            for (region, color) in &boxes {
                draw_region(img, region, *color);
            }
        });

        Ok(Some(EyeReading::Estimated(estimate_ear(eye_count))))
    }

    fn name(&self) -> &'static str {
        "cascade"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns canned boxes and remembers the image sizes it saw
    struct Fixed {
        boxes: Vec<Rect>,
        seen: Vec<(u32, u32)>,
    }

    impl Fixed {
        fn new(boxes: Vec<Rect>) -> Self {
            Self { boxes, seen: Vec::new() }
        }
    }

    impl RegionDetector for Fixed {
        fn detect(&mut self, gray: &GrayImage) -> Result<Vec<Rect>, DetectionError> {
            self.seen.push(gray.dimensions());
            Ok(self.boxes.clone())
        }
    }

    fn extract(faces: Vec<Rect>, eyes: Vec<Rect>) -> (f64, CascadeExtractor<Fixed, Fixed>) {
        let mut extractor = CascadeExtractor::new(Fixed::new(faces), Fixed::new(eyes), &CascadeConfig::default());
        let mut frame = VideoFrame::blank(320, 240);
        let reading = extractor.extract(&mut frame).unwrap();
        match reading {
            Some(EyeReading::Estimated(ear)) => (ear, extractor),
            other => panic!("unexpected reading {:?}", other),
        }
    }

    #[test]
    fn test_estimates_from_eye_count() {
        let face = Rect::new(100, 50, 100, 100);
        let eye = Rect::new(10, 10, 20, 10);
        assert_eq!(extract(vec![face], vec![eye, eye]).0, EAR_EYES_OPEN);
        assert_eq!(extract(vec![face], vec![eye]).0, EAR_EYES_PARTIAL);
        assert_eq!(extract(vec![face], vec![]).0, EAR_EYES_CLOSED);
        assert_eq!(extract(vec![face], vec![eye, eye, eye]).0, EAR_EYES_OPEN);
    }

    #[test]
    fn test_eyes_searched_in_upper_face() {
        let (_, extractor) = extract(vec![Rect::new(100, 50, 100, 100)], vec![]);
        assert_eq!(extractor.eyes.seen, vec![(100, 60)]);
    }

    #[test]
    fn test_no_face_reads_as_closed() {
        let (ear, extractor) = extract(vec![], vec![Rect::new(0, 0, 5, 5)]);
        assert_eq!(ear, EAR_EYES_CLOSED);
        assert!(extractor.eyes.seen.is_empty());
    }

    #[test]
    fn test_face_box_is_drawn() {
        let mut extractor = CascadeExtractor::new(
            Fixed::new(vec![Rect::new(10, 10, 40, 40)]),
            Fixed::new(vec![]),
            &CascadeConfig::default(),
        );
        let mut frame = VideoFrame::blank(100, 100);
        extractor.extract(&mut frame).unwrap();
        assert_eq!(frame.get_pixel(10, 30), Some(BLUE.0));
    }
}
