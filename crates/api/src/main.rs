//! Drowsiness Monitor - HTTP Server Entry Point

use anyhow::Context;
use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_logging(&settings.logging);

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        ear_threshold = settings.detection.ear_threshold,
        consecutive_frames = settings.detection.consecutive_frames,
        camera = %settings.camera.device,
        "Detection settings"
    );

    run_server(settings).await
}
