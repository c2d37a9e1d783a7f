//! Drowsiness Monitoring API Server
//!
//! REST endpoints for starting and stopping monitoring sessions, logging
//! alerts, live stats, session history, and the MJPEG video feed.

use anyhow::Context;
use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tower::ServiceBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use alerting::{sound_for, AlertDispatcher};
use session::{ConfiguredCamera, DetectorFactory, SessionCoordinator, WorkerSettings};
use storage::{Repository, SessionStore};

pub mod auth;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod routes;
pub mod settings;

pub use auth::{CurrentUser, USER_HEADER};
pub use error::ApiError;
pub use logging::{init_logging, LoggingConfig};
pub use rate_limit::{create_governor_config, DefaultGovernorConfig, RateLimitConfig};
pub use settings::{ServerConfig, Settings};

/// Application state shared across handlers
pub struct AppState {
    pub coordinator: SessionCoordinator,
    pub store: Arc<dyn SessionStore>,
    pub version: String,
    pub start_time: Instant,
    /// Present when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(coordinator: SessionCoordinator, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            store: Arc::clone(coordinator.store()),
            coordinator,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics,
        }
    }
}

/// Create the application router.
///
/// `rate_limit` applies to the `/api` routes only and needs peer addresses
/// from `into_make_service_with_connect_info`.
pub fn create_router(state: Arc<AppState>, rate_limit: Option<Arc<DefaultGovernorConfig>>) -> Router {
    let api = Router::new()
        .route("/api/v1/monitoring/start", post(routes::monitoring::start))
        .route("/api/v1/monitoring/stop", post(routes::monitoring::stop))
        .route("/api/v1/logout", post(routes::monitoring::logout))
        .route("/api/drowsiness-alert", post(routes::alerts::record_alert))
        .route("/api/session-stats", get(routes::stats::session_stats))
        .route("/api/v1/sessions", get(routes::sessions::list_sessions))
        .route("/api/v1/sessions/:id", get(routes::sessions::get_session))
        .route("/api/v1/dashboard", get(routes::sessions::dashboard))
        .route("/api/v1/health", get(routes::health::health));

    let api = match rate_limit {
        Some(config) => api.layer(GovernorLayer { config }),
        None => api,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_HEADER)]);

    Router::new()
        .route("/video-feed", get(routes::stream::video_feed))
        .route("/metrics", get(routes::health::metrics))
        .merge(api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Run the server until ctrl-c, then stop every session
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe_metrics();
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed, /metrics will be empty");
            None
        }
    };

    settings
        .detection
        .validate()
        .context("invalid detection settings")?;

    let dispatcher = AlertDispatcher::start(&Handle::current(), sound_for(&settings.alert), &settings.alert);
    let store: Arc<dyn SessionStore> = Arc::new(Repository::new());
    let coordinator = SessionCoordinator::new(
        store,
        Arc::new(ConfiguredCamera::new(settings.camera.clone())),
        Arc::new(DetectorFactory::new(settings.detection.clone(), Some(dispatcher.trigger()))),
        WorkerSettings::from(&settings.camera),
    );

    let governor = create_governor_config(&settings.rate_limit)?;
    let cleanup = rate_limit::spawn_limiter_cleanup(
        &governor,
        Duration::from_secs(settings.server.limiter_cleanup_secs.max(1)),
    );

    let state = Arc::new(AppState::new(coordinator.clone(), metrics));
    let app = create_router(state, Some(governor));

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind_addr))?;
    info!(addr = %settings.server.bind_addr, "Starting API server");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Stopping active sessions");
    coordinator.shutdown().await;
    cleanup.abort();
    dispatcher.shutdown();
    info!(alerts_played = dispatcher.played(), "Shutdown complete");
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("drowsiness_alerts_total", "Drowsiness episodes detected by the pipeline");
    metrics::describe_counter!("frames_processed_total", "Frames run through the detection pipeline");
    metrics::describe_counter!("alert_sounds_dropped_total", "Alert sounds dropped while one was playing");
    metrics::describe_gauge!("active_sessions", "Monitoring sessions currently running");
    metrics::describe_histogram!(
        "frame_processing_seconds",
        metrics::Unit::Seconds,
        "Time spent processing one frame"
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
