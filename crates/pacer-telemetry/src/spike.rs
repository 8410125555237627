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

//! EMA spike detection for frame pacing.

use std::time::Duration;

/// Tuning for a [`SpikeDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeConfig {
    /// EMA smoothing factor in `(0, 1]`.
    pub alpha: f64,
    /// A raw sample strictly above this value is a spike.
    pub threshold_ms: f64,
    /// How long throttling stays active after the latest spike.
    pub cooldown: Duration,
    /// Initial EMA value, normally the target frame time.
    pub baseline_ms: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            threshold_ms: 28.0,
            cooldown: Duration::from_millis(750),
            baseline_ms: 16.6,
        }
    }
}

/// Smooths a duration stream and opens a throttle window on every spike.
///
/// The spike test uses the raw sample, not the EMA, so a single long frame is
/// enough to trigger. A new spike during an open window restarts the window
/// from that spike; windows never stack.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    config: SpikeConfig,
    ema: f64,
    cooldown_end: Option<Duration>,
    spike_count: u64,
}

impl SpikeDetector {
    /// Creates a detector with the EMA seeded at `config.baseline_ms`.
    pub fn new(config: SpikeConfig) -> Self {
        Self {
            ema: config.baseline_ms,
            config,
            cooldown_end: None,
            spike_count: 0,
        }
    }

    /// Feeds one sample and returns whether throttling is active afterwards.
    ///
    /// Non-finite or negative samples are ignored.
    pub fn on_sample(&mut self, sample_ms: f64, now: Duration) -> bool {
        if !sample_ms.is_finite() || sample_ms < 0.0 {
            return self.is_throttling_active(now);
        }

        let alpha = self.config.alpha;
        self.ema = alpha * sample_ms + (1.0 - alpha) * self.ema;

        if sample_ms > self.config.threshold_ms {
            self.spike_count += 1;
            self.cooldown_end = Some(now + self.config.cooldown);
            log::debug!(
                "SpikeDetector: spike {:.1}ms > {:.1}ms (ema={:.2}), throttling for {:?}",
                sample_ms,
                self.config.threshold_ms,
                self.ema,
                self.config.cooldown
            );
        }

        self.is_throttling_active(now)
    }

    /// Returns `true` while `now` is inside the cooldown window.
    pub fn is_throttling_active(&self, now: Duration) -> bool {
        self.cooldown_end.is_some_and(|end| now < end)
    }

    /// Time left in the cooldown window.
    pub fn throttle_remaining(&self, now: Duration) -> Duration {
        self.cooldown_end
            .map(|end| end.saturating_sub(now))
            .unwrap_or(Duration::ZERO)
    }

    /// End of the current or last cooldown window.
    pub fn cooldown_end(&self) -> Option<Duration> {
        self.cooldown_end
    }

    /// The smoothed signal.
    pub fn ema(&self) -> f64 {
        self.ema
    }

    /// Spikes seen since creation or the last counter reset.
    pub fn spike_count(&self) -> u64 {
        self.spike_count
    }

    /// Zeroes the spike counter.
    pub fn reset_spike_counter(&mut self) {
        self.spike_count = 0;
    }

    /// Current tuning.
    pub fn config(&self) -> &SpikeConfig {
        &self.config
    }

    /// Replaces the tuning. The EMA and any open window are kept.
    pub fn set_config(&mut self, config: SpikeConfig) {
        self.config = config;
    }
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(SpikeConfig::default())
    }
}
