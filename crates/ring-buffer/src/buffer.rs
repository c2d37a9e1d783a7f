//! Bounded Ring Buffer Implementation

use std::collections::VecDeque;

/// Default buffer capacity (100 samples = ~6.5 s of evaluated frames at 15fps)
pub const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity ring buffer; pushing into a full buffer evicts the oldest item.
///
/// Single writer: the owner pushes through `&mut self`, readers get copies.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Pre-allocated storage, oldest at the front
    storage: VecDeque<T>,
    /// Capacity of the buffer
    capacity: usize,
    /// Total items written (for statistics)
    total_written: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    /// Create a buffer with default capacity (100 samples)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Push an item, returning the evicted oldest item if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.storage.len() == self.capacity {
            self.storage.pop_front()
        } else {
            None
        };
        self.storage.push_back(item);
        self.total_written += 1;
        evicted
    }

    /// Get the number of items currently in the buffer
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.storage.len() == self.capacity
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Most recent item
    pub fn latest(&self) -> Option<&T> {
        self.storage.back()
    }

    /// Oldest retained item
    pub fn oldest(&self) -> Option<&T> {
        self.storage.front()
    }

    /// Read the last N items (most recent first)
    pub fn read_last(&self, count: usize) -> Vec<T> {
        self.storage.iter().rev().take(count).cloned().collect()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.storage.iter()
    }

    /// Get total items written (for statistics)
    pub fn total_written(&self) -> usize {
        self.total_written
    }

    /// Clear the buffer and its write counter
    pub fn clear(&mut self) {
        self.storage.clear();
        self.total_written = 0;
    }
}

impl<T: Clone> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EarSample;
    use proptest::prelude::*;

    fn sample(i: u64) -> EarSample {
        EarSample {
            frame_index: i,
            ear: 0.3,
        }
    }

    #[test]
    fn test_push_and_read() {
        let mut buffer = RingBuffer::new(10);

        for i in 0..5 {
            buffer.push(sample(i));
        }

        assert_eq!(buffer.len(), 5);

        let samples = buffer.read_last(3);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].frame_index, 4); // Most recent
        assert_eq!(samples[2].frame_index, 2);
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::new(5);

        for i in 0..10 {
            buffer.push(sample(i));
        }

        assert_eq!(buffer.len(), 5);
        assert!(buffer.is_full());
        assert_eq!(buffer.oldest().unwrap().frame_index, 5);
        assert_eq!(buffer.latest().unwrap().frame_index, 9);
        assert_eq!(buffer.total_written(), 10);
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut buffer = RingBuffer::new(2);
        assert!(buffer.push(sample(0)).is_none());
        assert!(buffer.push(sample(1)).is_none());
        assert_eq!(buffer.push(sample(2)).unwrap().frame_index, 0);
    }

    #[test]
    fn test_fill_ratio() {
        let mut buffer = RingBuffer::new(100);
        assert_eq!(buffer.fill_ratio(), 0.0);

        for i in 0..50 {
            buffer.push(sample(i));
        }

        assert!((buffer.fill_ratio() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_clear() {
        let mut buffer = RingBuffer::new(3);
        buffer.push(sample(1));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_written(), 0);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity_and_keeps_newest(cap in 1usize..150, n in 0u64..400) {
            let mut buffer = RingBuffer::new(cap);
            for i in 0..n {
                buffer.push(sample(i));
                prop_assert!(buffer.len() <= cap);
            }
            let kept: Vec<u64> = buffer.iter().map(|s| s.frame_index).collect();
            let first = n.saturating_sub(cap as u64);
            let expected: Vec<u64> = (first..n).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
