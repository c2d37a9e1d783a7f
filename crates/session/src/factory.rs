//! Camera and pipeline construction seams

use alerting::AlertTrigger;
use camera_capture::{open_camera, CameraConfig, CameraError, FrameSource};
use detection::{build_extractor, DetectionConfig, DetectionError, FramePipeline};

/// Opens a frame source for a new session
pub trait CameraOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

impl<F> CameraOpener for F
where
    F: Fn() -> Result<Box<dyn FrameSource>, CameraError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        self()
    }
}

/// Opens the device named in the camera configuration
pub struct ConfiguredCamera {
    config: CameraConfig,
}

impl ConfiguredCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

impl CameraOpener for ConfiguredCamera {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        open_camera(&self.config)
    }
}

/// Builds a pipeline when a user has no idle one to reuse
pub trait PipelineFactory: Send + Sync {
    fn build(&self) -> Result<FramePipeline, DetectionError>;
}

impl<F> PipelineFactory for F
where
    F: Fn() -> Result<FramePipeline, DetectionError> + Send + Sync,
{
    fn build(&self) -> Result<FramePipeline, DetectionError> {
        self()
    }
}

/// Best available extractor with the configured thresholds and alert sound
pub struct DetectorFactory {
    config: DetectionConfig,
    alert: Option<AlertTrigger>,
}

impl DetectorFactory {
    pub fn new(config: DetectionConfig, alert: Option<AlertTrigger>) -> Self {
        Self { config, alert }
    }
}

impl PipelineFactory for DetectorFactory {
    fn build(&self) -> Result<FramePipeline, DetectionError> {
        let extractor = build_extractor(&self.config)?;
        let mut pipeline = FramePipeline::new(self.config.clone(), extractor)?;
        pipeline.set_alert_trigger(self.alert.clone());
        Ok(pipeline)
    }
}
