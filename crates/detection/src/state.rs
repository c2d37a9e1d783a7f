//! Drowsiness state tracking

use serde::{Deserialize, Serialize};

/// Where the debounce currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Awake,
    /// Closed-eye samples seen so far in the current run
    Accumulating(u32),
    Alerting,
}

/// Mutable per-pipeline detection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionState {
    /// Consecutive samples below threshold
    pub frame_counter: u32,
    /// An alert already fired for the current run
    pub alert_triggered: bool,
    /// Alerts fired since the last reset
    pub drowsy_episode_count: u32,
}

/// Emitted once when a run of closed-eye samples reaches the limit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessEvent {
    /// 1-based episode number within the pipeline's lifetime
    pub episode: u32,
    pub frame_counter: u32,
    pub ear: f64,
}

/// Threshold + run-length debounce over EAR samples.
///
/// Blinks dip EAR for a few samples; only a run of `consecutive_frames`
/// samples below `ear_threshold` fires, and only once per run.
#[derive(Debug, Clone)]
pub struct DrowsinessTracker {
    ear_threshold: f64,
    consecutive_frames: u32,
    state: DetectionState,
}

impl DrowsinessTracker {
    pub fn new(ear_threshold: f64, consecutive_frames: u32) -> Self {
        Self {
            ear_threshold,
            consecutive_frames: consecutive_frames.max(1),
            state: DetectionState::default(),
        }
    }

    /// Feed one sample; returns an event on the transition into alerting
    pub fn update(&mut self, ear: f64) -> Option<DrowsinessEvent> {
        if ear >= self.ear_threshold {
            self.state.frame_counter = 0;
            self.state.alert_triggered = false;
            return None;
        }

        self.state.frame_counter = self.state.frame_counter.saturating_add(1);
        if self.state.frame_counter >= self.consecutive_frames && !self.state.alert_triggered {
            self.state.alert_triggered = true;
            self.state.drowsy_episode_count += 1;
            return Some(DrowsinessEvent {
                episode: self.state.drowsy_episode_count,
                frame_counter: self.state.frame_counter,
                ear,
            });
        }
        None
    }

    pub fn phase(&self) -> Phase {
        if self.state.alert_triggered {
            Phase::Alerting
        } else if self.state.frame_counter > 0 {
            Phase::Accumulating(self.state.frame_counter)
        } else {
            Phase::Awake
        }
    }

    pub fn is_alerting(&self) -> bool {
        self.state.alert_triggered
    }

    pub fn episodes(&self) -> u32 {
        self.state.drowsy_episode_count
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn ear_threshold(&self) -> f64 {
        self.ear_threshold
    }

    /// Back to awake with all counters cleared
    pub fn reset(&mut self) {
        self.state = DetectionState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const THRESHOLD: f64 = 0.25;
    const FRAMES: u32 = 20;

    fn feed(tracker: &mut DrowsinessTracker, ear: f64, n: usize) -> usize {
        (0..n).filter(|_| tracker.update(ear).is_some()).count()
    }

    #[test]
    fn test_alert_fires_on_twentieth_sample() {
        let mut tracker = DrowsinessTracker::new(THRESHOLD, FRAMES);

        assert_eq!(feed(&mut tracker, 0.10, 19), 0);
        assert_eq!(tracker.phase(), Phase::Accumulating(19));

        let event = tracker.update(0.10).expect("alert on 20th sample");
        assert_eq!(event.episode, 1);
        assert_eq!(event.frame_counter, 20);
        assert_eq!(tracker.episodes(), 1);
        assert_eq!(tracker.phase(), Phase::Alerting);

        assert!(tracker.update(0.30).is_none());
        assert_eq!(tracker.phase(), Phase::Awake);

        assert_eq!(feed(&mut tracker, 0.10, 20), 1);
        assert_eq!(tracker.episodes(), 2);
    }

    #[test]
    fn test_long_run_fires_once() {
        let mut tracker = DrowsinessTracker::new(THRESHOLD, FRAMES);
        assert_eq!(feed(&mut tracker, 0.05, 200), 1);
        assert!(tracker.is_alerting());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut tracker = DrowsinessTracker::new(THRESHOLD, 1);
        assert!(tracker.update(THRESHOLD).is_none());
        assert!(tracker.update(THRESHOLD - 1e-6).is_some());
    }

    #[test]
    fn test_blinks_do_not_alert() {
        let mut tracker = DrowsinessTracker::new(THRESHOLD, FRAMES);
        for _ in 0..50 {
            assert_eq!(feed(&mut tracker, 0.08, 3), 0);
            assert_eq!(feed(&mut tracker, 0.32, 10), 0);
        }
        assert_eq!(tracker.episodes(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = DrowsinessTracker::new(THRESHOLD, FRAMES);
        feed(&mut tracker, 0.1, 25);
        tracker.reset();
        assert_eq!(tracker.state(), DetectionState::default());
        assert_eq!(tracker.phase(), Phase::Awake);
    }

    /// Maximal runs below threshold with length >= FRAMES
    fn expected_episodes(samples: &[f64]) -> u32 {
        let mut episodes = 0;
        let mut run = 0u32;
        for &ear in samples {
            if ear < THRESHOLD {
                run += 1;
                if run == FRAMES {
                    episodes += 1;
                }
            } else {
                run = 0;
            }
        }
        episodes
    }

    proptest! {
        #[test]
        fn prop_episode_count_matches_runs(
            runs in proptest::collection::vec((any::<bool>(), 1usize..45), 0..30)
        ) {
            let samples: Vec<f64> = runs
                .iter()
                .flat_map(|&(closed, len)| std::iter::repeat(if closed { 0.12 } else { 0.31 }).take(len))
                .collect();

            let mut tracker = DrowsinessTracker::new(THRESHOLD, FRAMES);
            let events = samples.iter().filter(|&&ear| tracker.update(ear).is_some()).count() as u32;

            prop_assert_eq!(tracker.episodes(), expected_episodes(&samples));
            prop_assert_eq!(events, tracker.episodes());
        }
    }
}
