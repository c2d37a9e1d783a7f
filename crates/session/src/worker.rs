//! Per-session detection worker

use camera_capture::FrameSource;
use detection::{DetectionStatistics, FramePipeline};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use storage::{SessionId, UserId};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::coordinator::Registry;
use crate::FramePacket;

/// Everything a worker needs besides its pipeline and camera
pub(crate) struct WorkerContext {
    pub user: UserId,
    pub session_id: SessionId,
    pub registry: Arc<Mutex<Registry>>,
    pub stats: watch::Sender<DetectionStatistics>,
    pub frames: broadcast::Sender<FramePacket>,
    pub frame_interval: Duration,
    pub mirror: bool,
    pub jpeg_quality: u8,
}

impl WorkerContext {
    /// Still the registered session for this user
    fn is_current(&self) -> bool {
        self.registry
            .lock()
            .map(|r| r.is_current(&self.user, self.session_id))
            .unwrap_or(false)
    }
}

/// Blocking frame loop; returns the pipeline so it can be reused.
///
/// Exits when the session is no longer registered or the camera stops
/// delivering frames. The camera is dropped on every exit path and video
/// feed subscribers see the stream close.
pub(crate) fn run(ctx: WorkerContext, mut pipeline: FramePipeline, mut source: Box<dyn FrameSource>) -> FramePipeline {
    info!(
        user = %ctx.user,
        session = ctx.session_id,
        camera = %source.describe(),
        extractor = pipeline.extractor_name(),
        "Detection worker started"
    );

    let mut processed = 0u64;
    while ctx.is_current() {
        let started = Instant::now();

        let mut frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(session = ctx.session_id, "Camera stream ended");
                break;
            }
            Err(e) => {
                warn!(session = ctx.session_id, error = %e, "Camera read failed, stopping worker");
                break;
            }
        };
        // Stop may have landed while the read was blocked
        if !ctx.is_current() {
            debug!(session = ctx.session_id, "Session stopped during read, frame discarded");
            break;
        }
        if ctx.mirror {
            frame.flip_horizontal();
        }

        let output = pipeline.process(frame);
        processed += 1;
        ctx.stats.send_replace(pipeline.statistics());

        if ctx.frames.receiver_count() > 0 {
            match output.frame.encode_jpeg(ctx.jpeg_quality) {
                Ok(jpeg) => {
                    // Subscribers may have left since the count was taken
                    let _ = ctx.frames.send(FramePacket {
                        jpeg: Arc::new(jpeg),
                        sequence: output.frame.sequence,
                        ear: output.ear,
                        is_drowsy: output.is_drowsy,
                    });
                }
                Err(e) => debug!(error = %e, "Could not encode frame"),
            }
        }

        if let Some(rest) = ctx.frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    drop(source);
    if let Ok(mut registry) = ctx.registry.lock() {
        registry.close_frames(&ctx.user, ctx.session_id);
    }
    info!(user = %ctx.user, session = ctx.session_id, frames = processed, "Detection worker stopped");
    pipeline
}
