//! Bounded Ring Buffer
//!
//! Keeps the most recent EAR samples for running statistics.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};

use serde::{Deserialize, Serialize};

/// One evaluated Eye Aspect Ratio reading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EarSample {
    /// Monotonic index of the frame that produced the sample
    pub frame_index: u64,
    pub ear: f64,
}
