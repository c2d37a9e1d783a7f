//! OpenCV webcam capture and local display window

use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::prelude::*;
use opencv::{highgui, videoio};
use std::time::Instant;
use tracing::{info, warn};

use crate::frame::VideoFrame;
use crate::source::FrameSource;
use crate::{CameraConfig, CameraError};

fn cv_err(e: opencv::Error) -> CameraError {
    CameraError::Stream(e.to_string())
}

/// Webcam (or video file) opened through OpenCV's videoio
pub struct OpenCvCamera {
    capture: videoio::VideoCapture,
    device: String,
    mat: Mat,
    started: Instant,
    sequence: u32,
}

impl OpenCvCamera {
    /// Open the device and apply resolution / fps / buffering hints
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let open_err = |e: opencv::Error| CameraError::Open(format!("{}: {}", config.device, e));

        let mut capture = match config.device.parse::<i32>() {
            Ok(index) => videoio::VideoCapture::new(index, videoio::CAP_ANY).map_err(open_err)?,
            Err(_) => videoio::VideoCapture::from_file(&config.device, videoio::CAP_ANY).map_err(open_err)?,
        };

        if !capture.is_opened().map_err(open_err)? {
            return Err(CameraError::Open(format!("Could not open camera {}", config.device)));
        }

        let hints = [
            (videoio::CAP_PROP_FRAME_WIDTH, config.width as f64),
            (videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64),
            (videoio::CAP_PROP_FPS, config.fps as f64),
            (videoio::CAP_PROP_BUFFERSIZE, config.buffer_size as f64),
        ];
        for (prop, value) in hints {
            // Drivers are free to ignore these
            if let Err(e) = capture.set(prop, value) {
                warn!(prop, value, error = %e, "Camera property not applied");
            }
        }

        info!(device = %config.device, width = config.width, height = config.height, fps = config.fps, "Camera opened");

        Ok(Self {
            capture,
            device: config.device.clone(),
            mat: Mat::default(),
            started: Instant::now(),
            sequence: 0,
        })
    }
}

impl FrameSource for OpenCvCamera {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if !self.capture.read(&mut self.mat).map_err(cv_err)? || self.mat.empty() {
            return Ok(None);
        }

        let width = self.mat.cols() as u32;
        let height = self.mat.rows() as u32;
        let bgr = self.mat.data_bytes().map_err(cv_err)?.to_vec();
        let frame = VideoFrame::from_bgr(
            bgr,
            width,
            height,
            self.started.elapsed().as_nanos() as u64,
            self.sequence,
        );
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("opencv camera {}", self.device)
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!(device = %self.device, error = %e, "Camera release failed");
        } else {
            info!(device = %self.device, "Camera released");
        }
    }
}

/// HighGUI window for local interactive mode
pub struct DisplayWindow {
    name: String,
}

impl DisplayWindow {
    pub fn new(name: &str) -> Result<Self, CameraError> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE).map_err(cv_err)?;
        Ok(Self { name: name.to_string() })
    }

    /// Show a frame and poll the keyboard; returns the pressed key, if any
    pub fn show(&self, frame: &VideoFrame) -> Result<Option<char>, CameraError> {
        let mut mat = Mat::new_rows_cols_with_default(
            frame.height as i32,
            frame.width as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )
        .map_err(cv_err)?;
        mat.data_bytes_mut().map_err(cv_err)?.copy_from_slice(&frame.to_bgr());

        highgui::imshow(&self.name, &mat).map_err(cv_err)?;
        let key = highgui::wait_key(1).map_err(cv_err)?;
        Ok(if key >= 0 { char::from_u32((key & 0xFF) as u32) } else { None })
    }
}

impl Drop for DisplayWindow {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.name);
    }
}
