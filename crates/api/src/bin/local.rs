//! Local interactive mode: camera, detector and alert sound on this machine.
//!
//! With the `opencv` feature the annotated frames are shown in a window and
//! `q` quits. Without it, status lines are logged instead.

use anyhow::Context;
use api::{init_logging, Settings};
use camera_capture::{open_camera, FrameSource};
use detection::{build_extractor, DrowsinessCallback, DrowsinessEvent, FramePipeline};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use alerting::{sound_for, AlertDispatcher};

/// Seconds between status lines when there is no window
const STATUS_EVERY: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_logging(&settings.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("failed to start alert runtime")?;
    let dispatcher = AlertDispatcher::start(runtime.handle(), sound_for(&settings.alert), &settings.alert);

    let extractor = build_extractor(&settings.detection).context("no landmark backend available")?;
    let mut pipeline = FramePipeline::new(settings.detection.clone(), extractor)?;
    pipeline.set_alert_trigger(Some(dispatcher.trigger()));
    pipeline.add_observer(Arc::new(DrowsinessCallback(|event: &DrowsinessEvent| {
        println!("DROWSINESS DETECTED! (episode {}, EAR {:.2})", event.episode, event.ear);
    })));
    info!(extractor = pipeline.extractor_name(), "Detector ready");

    let result = run(&settings, &mut pipeline);

    dispatcher.shutdown();
    let state = pipeline.state();
    info!(
        episodes = state.drowsy_episode_count,
        frames = pipeline.frames_seen(),
        "Monitoring stopped"
    );
    result
}

fn run(settings: &Settings, pipeline: &mut FramePipeline) -> anyhow::Result<()> {
    let mut camera = open_camera(&settings.camera).context("failed to open camera")?;
    info!(device = %settings.camera.device, "Camera opened");

    #[cfg(feature = "opencv")]
    let window = camera_capture::webcam::DisplayWindow::new("Drowsiness Detection")?;

    let interval = settings.camera.frame_interval();
    let mut last_status = Instant::now();

    loop {
        let started = Instant::now();
        let mut frame = match camera.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Camera stream ended");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Camera read failed");
                break;
            }
        };
        if settings.camera.mirror {
            frame.flip_horizontal();
        }

        let processed = pipeline.process(frame);

        #[cfg(feature = "opencv")]
        {
            if window.show(&processed.frame)? == Some('q') {
                info!("Quit requested");
                break;
            }
        }

        if last_status.elapsed() >= STATUS_EVERY {
            let stats = pipeline.statistics();
            info!(
                ear = processed.ear,
                drowsy = processed.is_drowsy,
                alerts = stats.total_alerts,
                "Status"
            );
            last_status = Instant::now();
        }

        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    Ok(())
}
