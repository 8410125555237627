// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Efficient storage for rolling timing samples.

/// A fixed-size circular buffer for storing numerical samples.
///
/// The capacity is chosen at construction (minimum 1) and never changes.
/// Once full, every push overwrites the oldest sample.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    index: usize,
    count: usize,
}

impl<T: Default + Copy> RingBuffer<T> {
    /// Creates a new, empty ring buffer holding up to `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity.max(1)],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a new value into the buffer, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        let capacity = self.data.len();
        self.data[self.index] = value;
        self.index = (self.index + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    /// Returns the number of elements currently in the buffer.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns the maximum number of elements the buffer holds.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` once the buffer has wrapped at least once.
    pub fn is_full(&self) -> bool {
        self.count == self.data.len()
    }

    /// Forgets every sample.
    pub fn clear(&mut self) {
        self.index = 0;
        self.count = 0;
    }

    /// Returns the most recently pushed value.
    pub fn latest(&self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.data.len();
        Some(self.data[(self.index + capacity - 1) % capacity])
    }

    /// Returns an iterator over the values in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (oldest, newest) = if self.is_full() {
            // Full: the write cursor points at the oldest value
            let (left, right) = self.data.split_at(self.index);
            (right, left)
        } else {
            // Not full: values sit in [0, count) in push order
            (&self.data[..self.count], &self.data[..0])
        };
        oldest.iter().chain(newest.iter())
    }
}

impl RingBuffer<f64> {
    /// Calculates the arithmetic mean of the values in the buffer.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.iter().sum::<f64>() / self.count as f64
    }

    /// Calculates the population variance of the values in the buffer.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let avg = self.average();
        let sum_sq: f64 = self.iter().map(|v| (v - avg) * (v - avg)).sum();
        sum_sq / self.count as f64
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Returns the minimum value in the buffer, or `0.0` if empty.
    pub fn min(&self) -> f64 {
        self.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    /// Returns the maximum value in the buffer, or `0.0` if empty.
    pub fn max(&self) -> f64 {
        self.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    /// Nearest-rank percentile, `p` in `[0, 100]`.
    ///
    /// The valid samples are sorted ascending and the element at
    /// `ceil(count * p / 100) - 1` (clamped to the sample range) is returned.
    /// An empty buffer yields `0.0`.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let last = self.count as i64 - 1;
        let rank = (self.count as f64 * p.clamp(0.0, 100.0) / 100.0).ceil() as i64 - 1;
        sorted[rank.clamp(0, last) as usize]
    }
}

/// Rolling window of duration samples in milliseconds.
///
/// Wraps a [`RingBuffer`] and refuses samples that cannot be durations.
#[derive(Debug, Clone)]
pub struct TimingTracker {
    samples: RingBuffer<f64>,
}

impl TimingTracker {
    /// Creates a tracker keeping the last `window` samples.
    pub fn new(window: usize) -> Self {
        Self {
            samples: RingBuffer::with_capacity(window),
        }
    }

    /// Records a sample. Negative or non-finite values are skipped and
    /// `false` is returned.
    pub fn record(&mut self, sample_ms: f64) -> bool {
        if !sample_ms.is_finite() || sample_ms < 0.0 {
            log::trace!("TimingTracker: skipped invalid sample {sample_ms}");
            return false;
        }
        self.samples.push(sample_ms);
        true
    }

    /// Mean of the retained samples, `0.0` when empty.
    pub fn average(&self) -> f64 {
        self.samples.average()
    }

    /// Nearest-rank percentile of the retained samples, `0.0` when empty.
    pub fn percentile(&self, p: f64) -> f64 {
        self.samples.percentile(p)
    }

    /// Population standard deviation of the retained samples.
    pub fn std_dev(&self) -> f64 {
        self.samples.std_dev()
    }

    /// The last recorded sample.
    pub fn latest(&self) -> Option<f64> {
        self.samples.latest()
    }

    /// Number of retained samples.
    pub fn count(&self) -> usize {
        self.samples.count()
    }

    /// Window size.
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Returns `true` once the window is saturated.
    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }

    /// Forgets every sample.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Read access to the underlying buffer.
    pub fn samples(&self) -> &RingBuffer<f64> {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_ring_buffer_push_and_iter() {
        let mut rb = RingBuffer::<f64>::with_capacity(3);
        rb.push(1.0);
        rb.push(2.0);
        rb.push(3.0);
        rb.push(4.0); // Overwrites 1.0

        let values: Vec<f64> = rb.iter().copied().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(rb.count(), 3);
        assert_eq!(rb.latest(), Some(4.0));
    }

    #[test]
    fn test_ring_buffer_partial_iter() {
        let mut rb = RingBuffer::<f64>::with_capacity(4);
        rb.push(5.0);
        rb.push(6.0);
        let values: Vec<f64> = rb.iter().copied().collect();
        assert_eq!(values, vec![5.0, 6.0]);
        assert!(!rb.is_full());
    }

    #[test]
    fn test_ring_buffer_zero_capacity_is_clamped() {
        let mut rb = RingBuffer::<f64>::with_capacity(0);
        assert_eq!(rb.capacity(), 1);
        rb.push(1.0);
        rb.push(2.0);
        assert_eq!(rb.average(), 2.0);
    }

    #[test]
    fn test_ring_buffer_variance() {
        let mut rb = RingBuffer::<f64>::with_capacity(4);
        for v in [5.0, 15.0, 5.0, 15.0] {
            rb.push(v);
        }
        // avg = 10.0, every deviation is 5.0
        assert_relative_eq!(rb.variance(), 25.0);
        assert_relative_eq!(rb.std_dev(), 5.0);
        assert_eq!(rb.min(), 5.0);
        assert_eq!(rb.max(), 15.0);
    }

    #[test]
    fn test_ring_buffer_empty() {
        let rb = RingBuffer::<f64>::with_capacity(4);
        assert_eq!(rb.average(), 0.0);
        assert_eq!(rb.percentile(50.0), 0.0);
        assert_eq!(rb.variance(), 0.0);
        assert_eq!(rb.latest(), None);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let mut rb = RingBuffer::<f64>::with_capacity(10);
        // Pushed out of order on purpose
        for v in [100.0, 10.0, 90.0, 20.0, 80.0, 30.0, 70.0, 40.0, 60.0, 50.0] {
            rb.push(v);
        }
        assert_eq!(rb.percentile(10.0), 10.0);
        assert_eq!(rb.percentile(50.0), 50.0);
        assert_eq!(rb.percentile(99.0), 100.0);
        assert_eq!(rb.percentile(100.0), 100.0);
        // p = 0 clamps to the smallest sample
        assert_eq!(rb.percentile(0.0), 10.0);
    }

    #[test]
    fn test_tracker_rejects_invalid_samples() {
        let mut tracker = TimingTracker::new(8);
        assert!(tracker.record(16.0));
        assert!(!tracker.record(f64::NAN));
        assert!(!tracker.record(-1.0));
        assert!(!tracker.record(f64::INFINITY));
        assert_eq!(tracker.count(), 1);
        assert_eq!(tracker.average(), 16.0);
    }

    #[test]
    fn test_tracker_reset() {
        let mut tracker = TimingTracker::new(2);
        tracker.record(1.0);
        tracker.record(2.0);
        assert!(tracker.is_full());
        tracker.reset();
        assert_eq!(tracker.count(), 0);
        assert_eq!(tracker.latest(), None);
    }

    proptest! {
        #[test]
        fn prop_average_covers_last_window(
            window in 1usize..32,
            samples in proptest::collection::vec(0.0f64..1000.0, 1..100),
        ) {
            let mut tracker = TimingTracker::new(window);
            for &s in &samples {
                tracker.record(s);
            }

            let kept = &samples[samples.len().saturating_sub(window)..];
            let expected = kept.iter().sum::<f64>() / kept.len() as f64;
            prop_assert_eq!(tracker.count(), kept.len());
            prop_assert!((tracker.average() - expected).abs() < 1e-6);
        }
    }
}
