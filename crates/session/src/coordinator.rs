//! Session Coordinator Implementation

use camera_capture::CameraConfig;
use chrono::{DateTime, Utc};
use detection::{DetectionStatistics, DrowsinessEvent, FramePipeline};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use storage::{SessionId, SessionRecord, SessionStore, StorageError, UserId};
use tokio::sync::{broadcast, mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::factory::{CameraOpener, PipelineFactory};
use crate::worker::{self, WorkerContext};
use crate::{ActiveStats, AlertOutcome, FramePacket, LiveStats, SessionError, SessionStarted};

/// Worker pacing and streaming settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub frame_interval: Duration,
    pub mirror: bool,
    pub jpeg_quality: u8,
    /// Encoded frames buffered per stream subscriber
    pub frame_buffer: usize,
    /// Stopped users whose pipeline is kept for a quick restart
    pub idle_pipelines: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&CameraConfig::default())
    }
}

impl From<&CameraConfig> for WorkerSettings {
    fn from(config: &CameraConfig) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            mirror: config.mirror,
            jpeg_quality: config.jpeg_quality,
            frame_buffer: 4,
            idle_pipelines: 8,
        }
    }
}

struct ActiveSession {
    session_id: SessionId,
    stats: watch::Receiver<DetectionStatistics>,
    /// `None` once the worker has exited
    frames: Option<broadcast::Sender<FramePacket>>,
    worker: JoinHandle<FramePipeline>,
    forwarder: JoinHandle<()>,
}

struct IdlePipeline {
    pipeline: FramePipeline,
    parked_at: Instant,
}

/// Active sessions and pipelines parked between sessions
#[derive(Default)]
pub(crate) struct Registry {
    active: HashMap<UserId, ActiveSession>,
    idle: HashMap<UserId, IdlePipeline>,
}

impl Registry {
    pub(crate) fn is_current(&self, user: &UserId, session_id: SessionId) -> bool {
        self.active.get(user).is_some_and(|a| a.session_id == session_id)
    }

    /// Drop the registry's frame sender so stream subscribers see the end
    pub(crate) fn close_frames(&mut self, user: &UserId, session_id: SessionId) {
        if let Some(active) = self.active.get_mut(user).filter(|a| a.session_id == session_id) {
            active.frames = None;
        }
    }

    /// Keep at most `capacity` idle pipelines, evicting the longest parked
    fn park(&mut self, user: &UserId, pipeline: FramePipeline, capacity: usize) {
        if capacity == 0 {
            return;
        }
        self.idle.insert(
            user.clone(),
            IdlePipeline {
                pipeline,
                parked_at: Instant::now(),
            },
        );
        while self.idle.len() > capacity {
            let oldest = self
                .idle
                .iter()
                .min_by_key(|(_, idle)| idle.parked_at)
                .map(|(user, _)| user.clone());
            match oldest {
                Some(user) => {
                    self.idle.remove(&user);
                    debug!(user = %user, "Evicted idle pipeline");
                }
                None => break,
            }
        }
    }
}

struct Inner {
    store: Arc<dyn SessionStore>,
    cameras: Arc<dyn CameraOpener>,
    pipelines: Arc<dyn PipelineFactory>,
    registry: Arc<Mutex<Registry>>,
    user_locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
    settings: WorkerSettings,
}

/// Owns every user's monitoring session.
///
/// At most one session is active per user. Start and stop for the same
/// user are serialized; different users never wait on each other beyond
/// short registry lookups.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        cameras: Arc<dyn CameraOpener>,
        pipelines: Arc<dyn PipelineFactory>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                cameras,
                pipelines,
                registry: Arc::new(Mutex::new(Registry::default())),
                user_locks: Mutex::new(HashMap::new()),
                settings,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    fn registry(&self) -> Result<MutexGuard<'_, Registry>, SessionError> {
        self.inner
            .registry
            .lock()
            .map_err(|e| SessionError::Registry(format!("Lock error: {}", e)))
    }

    fn user_lock(&self, user: &UserId) -> Result<Arc<AsyncMutex<()>>, SessionError> {
        let mut locks = self
            .inner
            .user_locks
            .lock()
            .map_err(|e| SessionError::Registry(format!("Lock error: {}", e)))?;
        Ok(Arc::clone(locks.entry(user.clone()).or_default()))
    }

    /// Forget `user`'s lock once nobody holds it
    fn release_user_lock(&self, user: &UserId) {
        if let Ok(mut locks) = self.inner.user_locks.lock() {
            if locks.get(user).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(user);
            }
        }
    }

    /// Start monitoring for `user`, replacing any session already running
    pub async fn start_session(&self, user: &UserId) -> Result<SessionStarted, SessionError> {
        let result = {
            let lock = self.user_lock(user)?;
            let _guard = lock.lock().await;
            self.start_locked(user).await
        };
        self.release_user_lock(user);
        result
    }

    async fn start_locked(&self, user: &UserId) -> Result<SessionStarted, SessionError> {
        let replaced = self.stop_locked(user).await?;
        if let Some(previous) = &replaced {
            info!(user = %user, session = previous.id, "Ended previous session before starting a new one");
        }

        let cameras = Arc::clone(&self.inner.cameras);
        let source = tokio::task::spawn_blocking(move || cameras.open())
            .await
            .map_err(|e| SessionError::Worker(e.to_string()))??;

        let idle = self.registry()?.idle.remove(user);
        let mut pipeline = match idle {
            Some(IdlePipeline { mut pipeline, .. }) => {
                pipeline.reset();
                pipeline
            }
            None => {
                let pipelines = Arc::clone(&self.inner.pipelines);
                tokio::task::spawn_blocking(move || pipelines.build())
                    .await
                    .map_err(|e| SessionError::Worker(e.to_string()))??
            }
        };

        let record = match self.inner.store.create_session(user) {
            Ok(record) => record,
            Err(e) => {
                self.registry()?.park(user, pipeline, self.inner.settings.idle_pipelines);
                return Err(e.into());
            }
        };

        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        pipeline.clear_observers();
        pipeline.add_observer(Arc::new(alert_tx));

        let (stats_tx, stats_rx) = watch::channel(DetectionStatistics::default());
        let (frames_tx, _) = broadcast::channel(self.inner.settings.frame_buffer.max(1));
        let ctx = WorkerContext {
            user: user.clone(),
            session_id: record.id,
            registry: Arc::clone(&self.inner.registry),
            stats: stats_tx,
            frames: frames_tx.clone(),
            frame_interval: self.inner.settings.frame_interval,
            mirror: self.inner.settings.mirror,
            jpeg_quality: self.inner.settings.jpeg_quality,
        };

        let forwarder = tokio::spawn(forward_alerts(
            Arc::clone(&self.inner.store),
            user.clone(),
            record.id,
            alert_rx,
        ));

        {
            // Registered before the worker's first membership check
            let mut registry = self.registry()?;
            let worker = tokio::task::spawn_blocking(move || worker::run(ctx, pipeline, source));
            registry.active.insert(
                user.clone(),
                ActiveSession {
                    session_id: record.id,
                    stats: stats_rx,
                    frames: Some(frames_tx),
                    worker,
                    forwarder,
                },
            );
        }
        metrics::gauge!("active_sessions").increment(1.0);
        info!(user = %user, session = record.id, "Monitoring session started");

        Ok(SessionStarted {
            session_id: record.id,
            session_start: record.session_start,
            replaced,
        })
    }

    /// Stop monitoring; `Ok(None)` if `user` had no active session
    pub async fn stop_session(&self, user: &UserId) -> Result<Option<SessionRecord>, SessionError> {
        let result = {
            let lock = self.user_lock(user)?;
            let _guard = lock.lock().await;
            self.stop_locked(user).await
        };
        self.release_user_lock(user);
        result
    }

    /// Stop monitoring and free `user`'s pipeline instead of parking it
    pub async fn release_session(&self, user: &UserId) -> Result<Option<SessionRecord>, SessionError> {
        let result = {
            let lock = self.user_lock(user)?;
            let _guard = lock.lock().await;
            let stopped = self.stop_locked(user).await;
            if self.registry()?.idle.remove(user).is_some() {
                debug!(user = %user, "Released detection pipeline");
            }
            stopped
        };
        self.release_user_lock(user);
        result
    }

    async fn stop_locked(&self, user: &UserId) -> Result<Option<SessionRecord>, SessionError> {
        let removed = self.registry()?.active.remove(user);
        let Some(active) = removed else {
            return Ok(None);
        };
        metrics::gauge!("active_sessions").decrement(1.0);

        match active.worker.await {
            Ok(mut pipeline) => {
                // Closes the alert channel so the forwarder drains and exits
                pipeline.clear_observers();
                self.registry()?.park(user, pipeline, self.inner.settings.idle_pipelines);
            }
            Err(e) => error!(user = %user, session = active.session_id, error = %e, "Detection worker failed"),
        }
        if let Err(e) = active.forwarder.await {
            warn!(session = active.session_id, error = %e, "Alert forwarder failed");
        }

        match self.inner.store.end_session(active.session_id) {
            Ok(end) => info!(
                user = %user,
                session = active.session_id,
                duration_secs = end.duration.as_secs(),
                "Monitoring session ended"
            ),
            Err(StorageError::SessionClosed(id)) => warn!(session = id, "Session was already ended"),
            Err(e) => return Err(e.into()),
        }

        Ok(Some(self.inner.store.get_session(user, active.session_id)?))
    }

    /// Log a drowsiness alert against `user`'s active session
    pub fn record_alert(&self, user: &UserId) -> Result<AlertOutcome, SessionError> {
        let session_id = match self.registry()?.active.get(user) {
            Some(active) => active.session_id,
            None => return Ok(AlertOutcome::Inactive),
        };
        match self.inner.store.append_alert(session_id, Utc::now()) {
            Ok(alert_count) => Ok(AlertOutcome::Recorded { alert_count }),
            Err(StorageError::SessionClosed(_)) => Ok(AlertOutcome::Inactive),
            Err(e) => Err(e.into()),
        }
    }

    /// Current counters for `user`'s session
    pub fn live_stats(&self, user: &UserId) -> Result<LiveStats, SessionError> {
        let (session_id, detection) = match self.registry()?.active.get(user) {
            Some(active) => (active.session_id, *active.stats.borrow()),
            None => return Ok(LiveStats::Inactive),
        };
        let record = self.inner.store.get_session(user, session_id)?;
        Ok(LiveStats::Active(ActiveStats {
            session_id,
            alert_count: record.alert_count,
            session_start: record.session_start,
            duration: elapsed_since(record.session_start),
            detection,
        }))
    }

    /// Annotated frames of `user`'s session, if one is running.
    ///
    /// After the camera stream has ended the receiver is already closed.
    pub fn subscribe_frames(&self, user: &UserId) -> Result<Option<broadcast::Receiver<FramePacket>>, SessionError> {
        let registry = self.registry()?;
        Ok(registry.active.get(user).map(|active| match &active.frames {
            Some(frames) => frames.subscribe(),
            None => broadcast::channel(1).1,
        }))
    }

    /// Number of stopped users with a parked pipeline
    pub fn idle_count(&self) -> usize {
        self.registry().map(|r| r.idle.len()).unwrap_or(0)
    }

    pub fn is_active(&self, user: &UserId) -> bool {
        self.registry().map(|r| r.active.contains_key(user)).unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.registry().map(|r| r.active.len()).unwrap_or(0)
    }

    /// Stop every active session
    pub async fn shutdown(&self) {
        let users: Vec<UserId> = match self.registry() {
            Ok(registry) => registry.active.keys().cloned().collect(),
            Err(e) => {
                error!(error = %e, "Could not read registry during shutdown");
                return;
            }
        };
        info!(sessions = users.len(), "Stopping all monitoring sessions");
        for user in users {
            if let Err(e) = self.stop_session(&user).await {
                error!(user = %user, error = %e, "Failed to stop session during shutdown");
            }
        }
    }
}

fn elapsed_since(start: DateTime<Utc>) -> Duration {
    (Utc::now() - start).to_std().unwrap_or_default()
}

/// Records pipeline alerts until the pipeline drops its sender
async fn forward_alerts(
    store: Arc<dyn SessionStore>,
    user: UserId,
    session_id: SessionId,
    mut events: mpsc::UnboundedReceiver<DrowsinessEvent>,
) {
    while let Some(event) = events.recv().await {
        match store.append_alert(session_id, Utc::now()) {
            Ok(alert_count) => info!(
                user = %user,
                session = session_id,
                episode = event.episode,
                alert_count,
                "Drowsiness alert recorded"
            ),
            Err(e) => warn!(session = session_id, error = %e, "Could not record drowsiness alert"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::{CameraError, FrameSource, ReplaySource, VideoFrame};
    use detection::{DetectionConfig, DetectionError, DetectionState, EyeReading, LandmarkExtractor};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;
    use storage::Repository;

    /// Reports the same EAR estimate for every frame
    struct Fixed(f64);

    impl LandmarkExtractor for Fixed {
        fn extract(&mut self, _frame: &mut VideoFrame) -> Result<Option<EyeReading>, DetectionError> {
            Ok(Some(EyeReading::Estimated(self.0)))
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct Harness {
        coordinator: SessionCoordinator,
        repo: Arc<Repository>,
        builds: Arc<AtomicUsize>,
        opens: Arc<AtomicUsize>,
    }

    /// `frames_per_open[i]` frames for the i-th camera open (`None` loops forever)
    fn harness(ear: f64, frames_per_open: Vec<Option<usize>>) -> Harness {
        harness_with(
            ear,
            frames_per_open,
            WorkerSettings {
                frame_interval: Duration::from_millis(1),
                ..Default::default()
            },
        )
    }

    fn harness_with(ear: f64, frames_per_open: Vec<Option<usize>>, settings: WorkerSettings) -> Harness {
        let repo = Arc::new(Repository::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let opens = Arc::new(AtomicUsize::new(0));

        let open_count = Arc::clone(&opens);
        let cameras = move || -> Result<Box<dyn FrameSource>, CameraError> {
            let n = open_count.fetch_add(1, Ordering::SeqCst);
            let frame = VideoFrame::blank(64, 48);
            match frames_per_open.get(n).copied().flatten() {
                Some(count) => Ok(Box::new(ReplaySource::new(vec![frame; count]))),
                None => Ok(Box::new(ReplaySource::looping(vec![frame]))),
            }
        };

        let build_count = Arc::clone(&builds);
        let pipelines = move || -> Result<FramePipeline, DetectionError> {
            build_count.fetch_add(1, Ordering::SeqCst);
            FramePipeline::new(
                DetectionConfig {
                    frame_skip: 1,
                    ..Default::default()
                },
                Box::new(Fixed(ear)),
            )
        };

        let coordinator = SessionCoordinator::new(
            Arc::clone(&repo) as Arc<dyn SessionStore>,
            Arc::new(cameras),
            Arc::new(pipelines),
            settings,
        );
        Harness {
            coordinator,
            repo,
            builds,
            opens,
        }
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_record_alert_without_session_is_inactive() {
        let h = harness(0.3, vec![]);
        let user = UserId::new("alice");

        assert_eq!(h.coordinator.record_alert(&user).unwrap(), AlertOutcome::Inactive);
        assert_eq!(h.repo.session_count(), 0);
        assert!(matches!(h.coordinator.live_stats(&user).unwrap(), LiveStats::Inactive));
        assert!(h.coordinator.stop_session(&user).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_record_alert_appends_to_active_session() {
        let h = harness(0.3, vec![]);
        let user = UserId::new("alice");
        let started = h.coordinator.start_session(&user).await.unwrap();

        assert_eq!(
            h.coordinator.record_alert(&user).unwrap(),
            AlertOutcome::Recorded { alert_count: 1 }
        );
        let record = h.coordinator.stop_session(&user).await.unwrap().unwrap();
        assert_eq!(record.id, started.session_id);
        assert_eq!(record.alert_count, 1);
        assert!(record.session_end.is_some());
        assert!(record.session_duration.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_double_start_replaces_session() {
        let h = harness(0.3, vec![]);
        let user = UserId::new("bob");

        let first = h.coordinator.start_session(&user).await.unwrap();
        let second = h.coordinator.start_session(&user).await.unwrap();

        assert_eq!(h.coordinator.active_count(), 1);
        assert_eq!(second.replaced.as_ref().map(|r| r.id), Some(first.session_id));
        let ended = h.repo.get_session(&user, first.session_id).unwrap();
        assert!(ended.session_end.is_some());
        assert!(h.repo.get_session(&user, second.session_id).unwrap().is_active());

        // The first pipeline was parked and reused
        assert_eq!(h.builds.load(Ordering::SeqCst), 1);
        h.coordinator.shutdown().await;
        assert_eq!(h.coordinator.active_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_gets_fresh_pipeline_state() {
        // First camera loops, second delivers nothing
        let h = harness(0.1, vec![None, Some(0)]);
        let user = UserId::new("carol");

        h.coordinator.start_session(&user).await.unwrap();
        eventually(|| matches!(h.coordinator.live_stats(&user), Ok(LiveStats::Active(s)) if s.detection.samples > 25)).await;
        h.coordinator.stop_session(&user).await.unwrap();

        h.coordinator.start_session(&user).await.unwrap();
        let record = h.coordinator.stop_session(&user).await.unwrap().unwrap();
        assert_eq!(record.alert_count, 0);

        let registry = h.coordinator.registry().unwrap();
        let pipeline = &registry.idle.get(&user).expect("pipeline parked").pipeline;
        assert_eq!(pipeline.state(), DetectionState::default());
        assert!(pipeline.history().is_empty());
        assert_eq!(h.builds.load(Ordering::SeqCst), 1);
        assert_eq!(h.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_camera_failure_creates_no_session() {
        let repo = Arc::new(Repository::new());
        let cameras = || -> Result<Box<dyn FrameSource>, CameraError> { Err(CameraError::Open("no device".into())) };
        let pipelines = || -> Result<FramePipeline, DetectionError> { Err(DetectionError::NoBackend) };
        let coordinator = SessionCoordinator::new(
            Arc::clone(&repo) as Arc<dyn SessionStore>,
            Arc::new(cameras),
            Arc::new(pipelines),
            WorkerSettings::default(),
        );
        let user = UserId::new("dave");

        let result = coordinator.start_session(&user).await;
        assert!(matches!(result, Err(SessionError::Camera(_))));
        assert_eq!(repo.session_count(), 0);
        assert!(!coordinator.is_active(&user));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipeline_alerts_are_recorded() {
        let h = harness(0.1, vec![]);
        let user = UserId::new("erin");
        h.coordinator.start_session(&user).await.unwrap();

        eventually(|| matches!(h.coordinator.live_stats(&user), Ok(LiveStats::Active(s)) if s.alert_count >= 1)).await;

        let record = h.coordinator.stop_session(&user).await.unwrap().unwrap();
        // A long closed-eye run is a single episode
        assert_eq!(record.alert_count, 1);
        assert_eq!(record.alert_timestamps().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_are_streamed_to_subscribers() {
        let h = harness(0.3, vec![]);
        let user = UserId::new("frank");
        assert!(h.coordinator.subscribe_frames(&user).unwrap().is_none());

        h.coordinator.start_session(&user).await.unwrap();
        let mut frames = h.coordinator.subscribe_frames(&user).unwrap().expect("active");
        let packet = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match frames.recv().await {
                    Ok(packet) => break packet,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("stream closed: {}", e),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(&packet.jpeg[..2], &[0xFF, 0xD8]);

        h.coordinator.stop_session(&user).await.unwrap();
        assert!(!h.coordinator.is_active(&user));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_frees_pipeline_and_user_lock() {
        let h = harness(0.3, vec![]);
        let user = UserId::new("grace");

        h.coordinator.start_session(&user).await.unwrap();
        h.coordinator.stop_session(&user).await.unwrap();
        assert_eq!(h.coordinator.idle_count(), 1);

        h.coordinator.start_session(&user).await.unwrap();
        let record = h.coordinator.release_session(&user).await.unwrap().unwrap();
        assert!(record.session_end.is_some());
        assert_eq!(h.coordinator.idle_count(), 0);
        assert!(h.coordinator.inner.user_locks.lock().unwrap().is_empty());

        // Nothing to stop, but any parked pipeline still goes
        assert!(h.coordinator.release_session(&user).await.unwrap().is_none());
        assert!(h.coordinator.inner.user_locks.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_pipelines_are_capped() {
        let h = harness_with(
            0.3,
            vec![],
            WorkerSettings {
                frame_interval: Duration::from_millis(1),
                idle_pipelines: 1,
                ..Default::default()
            },
        );
        let first = UserId::new("heidi");
        let second = UserId::new("ivan");

        h.coordinator.start_session(&first).await.unwrap();
        h.coordinator.stop_session(&first).await.unwrap();
        h.coordinator.start_session(&second).await.unwrap();
        h.coordinator.stop_session(&second).await.unwrap();

        let registry = h.coordinator.registry().unwrap();
        assert_eq!(registry.idle.len(), 1);
        assert!(registry.idle.contains_key(&second));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_idle_pipelines_when_capacity_is_zero() {
        let h = harness_with(
            0.3,
            vec![],
            WorkerSettings {
                frame_interval: Duration::from_millis(1),
                idle_pipelines: 0,
                ..Default::default()
            },
        );
        let user = UserId::new("judy");

        h.coordinator.start_session(&user).await.unwrap();
        h.coordinator.stop_session(&user).await.unwrap();
        h.coordinator.start_session(&user).await.unwrap();
        h.coordinator.stop_session(&user).await.unwrap();

        assert_eq!(h.coordinator.idle_count(), 0);
        assert_eq!(h.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_video_feed_closes_when_camera_ends() {
        let h = harness(0.3, vec![Some(3)]);
        let user = UserId::new("mallory");
        h.coordinator.start_session(&user).await.unwrap();
        let mut frames = h.coordinator.subscribe_frames(&user).unwrap().expect("active");

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match frames.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .await
        .expect("feed should close once the camera ends");

        // The session stays open until stopped; late subscribers get a closed feed
        assert!(h.coordinator.is_active(&user));
        let mut late = h.coordinator.subscribe_frames(&user).unwrap().expect("active");
        assert!(matches!(late.recv().await, Err(broadcast::error::RecvError::Closed)));
        h.coordinator.stop_session(&user).await.unwrap();
    }

    /// Blocks inside `read_frame` until the test opens the gate
    struct GatedSource {
        entered: Arc<AtomicBool>,
        gate: std_mpsc::Receiver<()>,
    }

    impl FrameSource for GatedSource {
        fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            self.entered.store(true, Ordering::SeqCst);
            match self.gate.recv() {
                Ok(()) => Ok(Some(VideoFrame::blank(64, 48))),
                Err(_) => Ok(None),
            }
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    /// Counts frames that reach landmark extraction
    struct Counting(Arc<AtomicUsize>);

    impl LandmarkExtractor for Counting {
        fn extract(&mut self, _frame: &mut VideoFrame) -> Result<Option<EyeReading>, DetectionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some(EyeReading::Estimated(0.1)))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frame_read_during_stop_is_discarded() {
        let repo = Arc::new(Repository::new());
        let entered = Arc::new(AtomicBool::new(false));
        let extracted = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = std_mpsc::channel();

        let source: Mutex<Option<Box<dyn FrameSource>>> = Mutex::new(Some(Box::new(GatedSource {
            entered: Arc::clone(&entered),
            gate: gate_rx,
        })));
        let cameras = move || -> Result<Box<dyn FrameSource>, CameraError> {
            source
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| CameraError::Open("already opened".into()))
        };
        let counter = Arc::clone(&extracted);
        let pipelines = move || -> Result<FramePipeline, DetectionError> {
            FramePipeline::new(
                DetectionConfig {
                    consecutive_frames: 1,
                    frame_skip: 1,
                    ..Default::default()
                },
                Box::new(Counting(Arc::clone(&counter))),
            )
        };
        let coordinator = SessionCoordinator::new(
            Arc::clone(&repo) as Arc<dyn SessionStore>,
            Arc::new(cameras),
            Arc::new(pipelines),
            WorkerSettings {
                frame_interval: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let user = UserId::new("nina");

        coordinator.start_session(&user).await.unwrap();
        eventually(|| entered.load(Ordering::SeqCst)).await;

        let stopping = coordinator.clone();
        let stop_user = user.clone();
        let stop = tokio::spawn(async move { stopping.stop_session(&stop_user).await });
        eventually(|| !coordinator.is_active(&user)).await;

        // The blocked read now returns a closed-eye frame
        gate_tx.send(()).unwrap();
        let record = stop.await.unwrap().unwrap().expect("session was active");

        assert_eq!(extracted.load(Ordering::SeqCst), 0);
        assert_eq!(record.alert_count, 0);
    }
}
