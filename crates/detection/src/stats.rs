//! Running EAR statistics

use ring_buffer::{EarSample, RingBuffer};
use serde::{Deserialize, Serialize};

/// Summary of a pipeline's recent samples
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionStatistics {
    pub total_alerts: u32,
    pub average_ear: f64,
    pub min_ear: f64,
    pub max_ear: f64,
    /// Most recent sample
    pub current_ear: f64,
    /// Fraction of buffered samples below the threshold (PERCLOS-style)
    pub closed_ratio: f64,
    pub samples: usize,
}

impl DetectionStatistics {
    /// All zeros when the buffer is empty
    pub fn from_history(history: &RingBuffer<EarSample>, total_alerts: u32, threshold: f64) -> Self {
        if history.is_empty() {
            return Self {
                total_alerts,
                ..Default::default()
            };
        }

        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut closed = 0usize;
        for sample in history.iter() {
            sum += sample.ear;
            min = min.min(sample.ear);
            max = max.max(sample.ear);
            if sample.ear < threshold {
                closed += 1;
            }
        }

        let n = history.len();
        Self {
            total_alerts,
            average_ear: sum / n as f64,
            min_ear: min,
            max_ear: max,
            current_ear: history.latest().map(|s| s.ear).unwrap_or_default(),
            closed_ratio: closed as f64 / n as f64,
            samples: n,
        }
    }
}
