//! OpenCV Haar cascade region detector

use image::GrayImage;
use opencv::core::{self, Mat, Scalar, Size, Vector, CV_8UC1};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use tracing::info;

use crate::cascade::RegionDetector;
use crate::landmarks::Rect;
use crate::DetectionError;

fn cv_err(e: opencv::Error) -> DetectionError {
    DetectionError::Inference(e.to_string())
}

/// A trained cascade with its multi-scale search parameters
pub struct HaarCascade {
    classifier: CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
}

impl HaarCascade {
    pub fn load(path: &str, scale_factor: f64, min_neighbors: i32) -> Result<Self, DetectionError> {
        let classifier =
            CascadeClassifier::new(path).map_err(|e| DetectionError::ModelLoad(format!("{}: {}", path, e)))?;
        if classifier.empty().map_err(|e| DetectionError::ModelLoad(e.to_string()))? {
            return Err(DetectionError::ModelLoad(format!("empty cascade: {}", path)));
        }
        info!("Loaded Haar cascade from {}", path);
        Ok(Self {
            classifier,
            scale_factor,
            min_neighbors,
        })
    }
}

impl RegionDetector for HaarCascade {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<Rect>, DetectionError> {
        let mut mat = Mat::new_rows_cols_with_default(
            gray.height() as i32,
            gray.width() as i32,
            CV_8UC1,
            Scalar::all(0.0),
        )
        .map_err(cv_err)?;
        mat.data_bytes_mut().map_err(cv_err)?.copy_from_slice(gray.as_raw());

        let mut found = Vector::<core::Rect>::new();
        self.classifier
            .detect_multi_scale(
                &mat,
                &mut found,
                self.scale_factor,
                self.min_neighbors,
                0,
                Size::new(0, 0),
                Size::new(0, 0),
            )
            .map_err(cv_err)?;

        Ok(found
            .iter()
            .filter(|r| r.x >= 0 && r.y >= 0 && r.width > 0 && r.height > 0)
            .map(|r| Rect::new(r.x as u32, r.y as u32, r.width as u32, r.height as u32))
            .collect())
    }
}
