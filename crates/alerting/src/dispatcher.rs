//! Alert Dispatcher Implementation

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sound::AlertSound;

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Play a sound on drowsiness (default: true)
    pub enabled: bool,
    /// Tone duration (default: 500 ms)
    pub duration_ms: u64,
    /// Pending sound requests before new ones are dropped
    pub queue_capacity: usize,
    /// Give up on a sound that takes longer than this
    pub timeout_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 500,
            queue_capacity: 4,
            timeout_ms: 2000,
        }
    }
}

/// A request to play the alert sound
#[derive(Debug, Clone, Copy)]
pub struct AlertRequest {
    /// Drowsy episode that caused the alert
    pub episode: u32,
    pub requested_at: Instant,
}

/// Cheap, cloneable, non-blocking handle used by frame loops
#[derive(Debug, Clone)]
pub struct AlertTrigger {
    tx: mpsc::Sender<AlertRequest>,
    dropped: Arc<AtomicU64>,
}

impl AlertTrigger {
    /// Queue a sound; never blocks. Returns false if the request was dropped.
    pub fn fire(&self, episode: u32) -> bool {
        let request = AlertRequest {
            episode,
            requested_at: Instant::now(),
        };
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("alert_sounds_dropped_total").increment(1);
                debug!(episode, "Alert sound queue full, dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(episode, "Alert dispatcher stopped, dropping request");
                false
            }
        }
    }
}

/// Drains alert requests on a background task of an explicit runtime.
///
/// Each sound runs on the blocking pool under a timeout; failures are
/// logged and never reach the caller of [`AlertTrigger::fire`].
pub struct AlertDispatcher {
    trigger: AlertTrigger,
    worker: JoinHandle<()>,
    played: Arc<AtomicU64>,
}

impl AlertDispatcher {
    /// Start the drain task on `runtime`
    pub fn start(runtime: &Handle, sound: Arc<dyn AlertSound>, config: &AlertConfig) -> Self {
        info!("Starting alert dispatcher with config: {:?}", config);
        let (tx, mut rx) = mpsc::channel::<AlertRequest>(config.queue_capacity.max(1));
        let played = Arc::new(AtomicU64::new(0));
        let timeout = Duration::from_millis(config.timeout_ms);

        let worker = {
            let runtime = runtime.clone();
            let played = Arc::clone(&played);
            runtime.clone().spawn(async move {
                while let Some(request) = rx.recv().await {
                    let sound = Arc::clone(&sound);
                    let task = runtime.spawn_blocking(move || sound.play());
                    match tokio::time::timeout(timeout, task).await {
                        Ok(Ok(Ok(()))) => {
                            played.fetch_add(1, Ordering::Relaxed);
                            debug!(
                                episode = request.episode,
                                latency_ms = request.requested_at.elapsed().as_millis() as u64,
                                "Alert sound played"
                            );
                        }
                        Ok(Ok(Err(e))) => warn!(episode = request.episode, error = %e, "Could not play alert sound"),
                        Ok(Err(e)) => warn!(episode = request.episode, error = %e, "Alert sound task failed"),
                        Err(_) => warn!(episode = request.episode, ?timeout, "Alert sound timed out"),
                    }
                }
                debug!("Alert dispatcher drained");
            })
        };

        Self {
            trigger: AlertTrigger {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            worker,
            played,
        }
    }

    /// Handle for frame loops
    pub fn trigger(&self) -> AlertTrigger {
        self.trigger.clone()
    }

    /// Sounds that finished successfully
    pub fn played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }

    /// Requests dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.trigger.dropped.load(Ordering::Relaxed)
    }

    /// Cancel the drain task; pending requests are discarded
    pub fn shutdown(&self) {
        self.worker.abort();
        info!(played = self.played(), dropped = self.dropped(), "Alert dispatcher stopped");
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlertError;
    use std::sync::atomic::AtomicUsize;

    struct Counting(Arc<AtomicUsize>);

    impl AlertSound for Counting {
        fn play(&self) -> Result<(), AlertError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Broken;

    impl AlertSound for Broken {
        fn play(&self) -> Result<(), AlertError> {
            Err(AlertError::Playback("no audio device".into()))
        }
    }

    struct Slow;

    impl AlertSound for Slow {
        fn play(&self) -> Result<(), AlertError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        }
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fire_plays_sound() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::start(
            &Handle::current(),
            Arc::new(Counting(Arc::clone(&count))),
            &AlertConfig::default(),
        );

        assert!(dispatcher.trigger().fire(1));
        wait_for(|| count.load(Ordering::SeqCst) == 1).await;
        wait_for(|| dispatcher.played() == 1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failure_is_contained() {
        let dispatcher = AlertDispatcher::start(&Handle::current(), Arc::new(Broken), &AlertConfig::default());
        let trigger = dispatcher.trigger();
        assert!(trigger.fire(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Still accepting work after a failed sound
        assert!(trigger.fire(2));
        assert_eq!(dispatcher.played(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_drops_without_blocking() {
        let config = AlertConfig {
            queue_capacity: 1,
            ..Default::default()
        };
        let dispatcher = AlertDispatcher::start(&Handle::current(), Arc::new(Slow), &config);
        let trigger = dispatcher.trigger();

        let started = Instant::now();
        let accepted = (0..10).filter(|i| trigger.fire(*i)).count();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(accepted < 10);
        assert_eq!(dispatcher.dropped(), (10 - accepted) as u64);
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let dispatcher = AlertDispatcher::start(&Handle::current(), Arc::new(crate::Silent), &AlertConfig::default());
        let trigger = dispatcher.trigger();
        dispatcher.shutdown();
        drop(dispatcher);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!trigger.fire(1));
    }
}
