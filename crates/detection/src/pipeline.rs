//! Frame pipeline: extract, score, debounce, annotate

use alerting::AlertTrigger;
use camera_capture::VideoFrame;
use ring_buffer::{EarSample, RingBuffer};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DetectionConfig;
use crate::ear::average_ear;
use crate::landmarks::{EyeReading, LandmarkExtractor};
use crate::overlay::{draw_eyes, OverlayInfo, OverlayRenderer, GREEN};
use crate::state::{DetectionState, DrowsinessEvent, DrowsinessTracker, Phase};
use crate::stats::DetectionStatistics;
use crate::DetectionError;

/// Output of one [`FramePipeline::process`] call
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Annotated frame at display resolution
    pub frame: VideoFrame,
    pub ear: f64,
    /// True only on the frame that started an alert
    pub is_drowsy: bool,
}

/// Notified from the frame loop; must not block
pub trait DetectionObserver: Send + Sync {
    fn on_drowsiness(&self, event: &DrowsinessEvent);

    fn on_frame_processed(&self, _ear: f64, _is_drowsy: bool) {}
}

impl DetectionObserver for mpsc::UnboundedSender<DrowsinessEvent> {
    fn on_drowsiness(&self, event: &DrowsinessEvent) {
        if self.send(*event).is_err() {
            debug!(episode = event.episode, "Drowsiness listener gone");
        }
    }
}

/// Adapts a closure into an observer
pub struct DrowsinessCallback<F>(pub F);

impl<F> DetectionObserver for DrowsinessCallback<F>
where
    F: Fn(&DrowsinessEvent) + Send + Sync,
{
    fn on_drowsiness(&self, event: &DrowsinessEvent) {
        (self.0)(event)
    }
}

/// One pipeline per monitored camera.
///
/// Owns the tracker and sample history; a single worker drives it, so no
/// internal locking.
pub struct FramePipeline {
    config: DetectionConfig,
    extractor: Box<dyn LandmarkExtractor>,
    tracker: DrowsinessTracker,
    history: RingBuffer<EarSample>,
    overlay: OverlayRenderer,
    frame_count: u64,
    alert: Option<AlertTrigger>,
    observers: Vec<Arc<dyn DetectionObserver>>,
}

impl FramePipeline {
    pub fn new(config: DetectionConfig, extractor: Box<dyn LandmarkExtractor>) -> Result<Self, DetectionError> {
        config.validate()?;
        let overlay = OverlayRenderer::new(&config.overlay, config.ear_threshold)?;
        info!(
            extractor = extractor.name(),
            threshold = config.ear_threshold,
            consecutive_frames = config.consecutive_frames,
            frame_skip = config.frame_skip,
            "Frame pipeline ready"
        );
        Ok(Self {
            tracker: DrowsinessTracker::new(config.ear_threshold, config.consecutive_frames),
            history: RingBuffer::new(config.history_capacity),
            overlay,
            frame_count: 0,
            alert: None,
            observers: Vec::new(),
            extractor,
            config,
        })
    }

    pub fn with_alert_trigger(mut self, trigger: AlertTrigger) -> Self {
        self.alert = Some(trigger);
        self
    }

    pub fn set_alert_trigger(&mut self, trigger: Option<AlertTrigger>) {
        self.alert = trigger;
    }

    pub fn add_observer(&mut self, observer: Arc<dyn DetectionObserver>) {
        self.observers.push(observer);
    }

    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }

    /// Run one frame through the pipeline.
    ///
    /// Only every `frame_skip`th frame is evaluated; the others repeat the
    /// last EAR and are annotated without touching the tracker.
    pub fn process(&mut self, mut frame: VideoFrame) -> ProcessedFrame {
        self.frame_count += 1;

        if self.frame_count % self.config.frame_skip as u64 != 0 {
            let ear = self.history.latest().map(|s| s.ear).unwrap_or(0.0);
            self.annotate(&mut frame, ear);
            return ProcessedFrame {
                frame,
                ear,
                is_drowsy: false,
            };
        }

        let started = Instant::now();
        let mut small = frame.resize(self.config.process_width, self.config.process_height);
        let reading = match self.extractor.extract(&mut small) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(extractor = self.extractor.name(), error = %e, "Landmark extraction failed");
                None
            }
        };

        let ear = match reading {
            None => self.config.no_face_ear,
            Some(EyeReading::Estimated(ear)) => ear,
            Some(EyeReading::Landmarks(eyes)) => {
                if self.config.overlay.show_landmarks {
                    let sx = frame.width as f64 / small.width.max(1) as f64;
                    let sy = frame.height as f64 / small.height.max(1) as f64;
                    draw_eyes(&mut frame, &eyes.scaled(sx, sy), GREEN);
                }
                average_ear(&eyes).unwrap_or_else(|| {
                    debug!("Degenerate eye geometry, reusing previous sample");
                    self.history.latest().map(|s| s.ear).unwrap_or(self.config.no_face_ear)
                })
            }
        };

        self.history.push(EarSample {
            frame_index: self.frame_count,
            ear,
        });

        let event = self.tracker.update(ear);
        if let Some(event) = &event {
            info!(episode = event.episode, ear = event.ear, "Drowsiness detected");
            metrics::counter!("drowsiness_alerts_total").increment(1);
            if let Some(alert) = &self.alert {
                alert.fire(event.episode);
            }
            for observer in &self.observers {
                observer.on_drowsiness(event);
            }
        }

        let is_drowsy = event.is_some();
        for observer in &self.observers {
            observer.on_frame_processed(ear, is_drowsy);
        }

        self.annotate(&mut frame, ear);
        metrics::counter!("frames_processed_total").increment(1);
        metrics::histogram!("frame_processing_seconds").record(started.elapsed().as_secs_f64());

        ProcessedFrame { frame, ear, is_drowsy }
    }

    fn annotate(&self, frame: &mut VideoFrame, ear: f64) {
        let info = OverlayInfo {
            ear,
            alert_count: self.tracker.episodes(),
            eyes_closed: ear < self.config.ear_threshold,
            alerting: self.tracker.is_alerting(),
        };
        self.overlay.render(frame, &info);
    }

    /// Clear counters, history and extractor tracking for a new session
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.history.clear();
        self.extractor.reset();
        self.frame_count = 0;
        debug!("Frame pipeline reset");
    }

    pub fn statistics(&self) -> DetectionStatistics {
        DetectionStatistics::from_history(&self.history, self.tracker.episodes(), self.config.ear_threshold)
    }

    pub fn state(&self) -> DetectionState {
        self.tracker.state()
    }

    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    pub fn history(&self) -> &RingBuffer<EarSample> {
        &self.history
    }

    pub fn frames_seen(&self) -> u64 {
        self.frame_count
    }

    pub fn extractor_name(&self) -> &'static str {
        self.extractor.name()
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }
}
