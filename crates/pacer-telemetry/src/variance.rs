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

//! Frame-time variance monitoring.

use crate::metrics::RingBuffer;

/// Number of frames the standard deviation is computed over.
pub const VARIANCE_HISTORY: usize = 30;

/// Signals that heavy work should be deferred while frame times are unstable.
///
/// When the standard deviation of the recent frames exceeds the threshold,
/// deferral stays active for a fixed number of further samples.
#[derive(Debug, Clone)]
pub struct VarianceMonitor {
    history: RingBuffer<f64>,
    threshold_ms: f64,
    deferral_samples: u32,
    countdown: u32,
    active: bool,
}

impl VarianceMonitor {
    /// Creates an inactive monitor.
    pub fn new(threshold_ms: f64, deferral_samples: u32) -> Self {
        Self {
            history: RingBuffer::with_capacity(VARIANCE_HISTORY),
            threshold_ms,
            deferral_samples,
            countdown: 0,
            active: false,
        }
    }

    /// Feeds a frame duration; returns whether deferral is active afterwards.
    pub fn on_sample(&mut self, sample_ms: f64) -> bool {
        if !sample_ms.is_finite() || sample_ms < 0.0 {
            return self.active;
        }
        self.history.push(sample_ms);

        let std_dev = self.history.std_dev();
        if std_dev > self.threshold_ms {
            if !self.active {
                log::debug!(
                    "VarianceMonitor: unstable frames (stddev={:.2}, avg={:.2}), deferring",
                    std_dev,
                    self.history.average()
                );
            }
            self.active = true;
            self.countdown = self.deferral_samples;
        }

        if self.countdown > 0 {
            self.countdown -= 1;
        } else {
            self.active = false;
        }
        self.active
    }

    /// Returns `true` while deferral is active.
    pub fn is_deferral_active(&self) -> bool {
        self.active
    }

    /// Mean of the recent frames.
    pub fn average(&self) -> f64 {
        self.history.average()
    }

    /// Standard deviation of the recent frames.
    pub fn std_dev(&self) -> f64 {
        self.history.std_dev()
    }

    /// Number of retained frames.
    pub fn history_len(&self) -> usize {
        self.history.count()
    }

    /// Updates the threshold and deferral length.
    pub fn configure(&mut self, threshold_ms: f64, deferral_samples: u32) {
        self.threshold_ms = threshold_ms;
        self.deferral_samples = deferral_samples;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_frames_never_defer() {
        let mut monitor = VarianceMonitor::new(5.0, 2);
        for _ in 0..60 {
            assert!(!monitor.on_sample(16.0));
        }
        assert_eq!(monitor.history_len(), VARIANCE_HISTORY);
        assert_eq!(monitor.std_dev(), 0.0);
    }

    #[test]
    fn test_unstable_frames_defer_then_clear() {
        let mut monitor = VarianceMonitor::new(5.0, 2);
        monitor.on_sample(10.0);
        // stddev of [10, 30] is 10
        assert!(monitor.on_sample(30.0));

        // Flood with stable frames until the spread falls under the threshold
        let mut cleared = false;
        for _ in 0..VARIANCE_HISTORY + 2 {
            if !monitor.on_sample(10.0) {
                cleared = true;
                break;
            }
        }
        assert!(cleared);
        assert!(!monitor.is_deferral_active());
    }
}
