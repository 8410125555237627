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

//! Memory growth burst detection.

use std::time::Duration;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Tuning for a [`MemoryPressureDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPressureConfig {
    /// Growth between two samples strictly above this opens a pressure window.
    pub growth_threshold_bytes: u64,
    /// Length of the pressure window.
    pub cooldown: Duration,
}

impl Default for MemoryPressureConfig {
    fn default() -> Self {
        Self {
            growth_threshold_bytes: 128 * BYTES_PER_MIB,
            cooldown: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LastSample {
    usage_bytes: u64,
    at: Duration,
}

/// Flags sudden memory growth.
///
/// Edge-triggered: a burst opens a window of fixed length, and a later burst
/// inside the window restarts it. Shrinking usage never counts as growth.
/// Once disabled (after a sampler fault) it never reports pressure again.
#[derive(Debug, Clone)]
pub struct MemoryPressureDetector {
    config: MemoryPressureConfig,
    last: Option<LastSample>,
    cooldown_end: Option<Duration>,
    pressure_events: u64,
    disabled_reason: Option<String>,
}

impl MemoryPressureDetector {
    /// Creates an enabled detector with no history.
    pub fn new(config: MemoryPressureConfig) -> Self {
        Self {
            config,
            last: None,
            cooldown_end: None,
            pressure_events: 0,
            disabled_reason: None,
        }
    }

    /// Feeds a usage reading taken at `now` and returns whether the detector
    /// is under pressure afterwards.
    ///
    /// The first reading only primes the detector. Readings whose timestamp
    /// does not advance are stored but not evaluated.
    pub fn on_sample(&mut self, usage_bytes: u64, now: Duration) -> bool {
        if !self.is_enabled() {
            return false;
        }

        if let Some(last) = self.last {
            if now > last.at {
                let growth = usage_bytes.saturating_sub(last.usage_bytes);
                if growth > self.config.growth_threshold_bytes {
                    self.cooldown_end = Some(now + self.config.cooldown);
                    self.pressure_events += 1;
                    log::info!(
                        "MemoryPressure: grew {} MiB in {:?}, pressure for {:?}",
                        growth / BYTES_PER_MIB,
                        now - last.at,
                        self.config.cooldown
                    );
                }
            }
        }

        self.last = Some(LastSample {
            usage_bytes,
            at: now,
        });
        self.is_under_pressure(now)
    }

    /// Returns `true` while enabled and inside the pressure window.
    pub fn is_under_pressure(&self, now: Duration) -> bool {
        self.is_enabled() && self.cooldown_end.is_some_and(|end| now < end)
    }

    /// Time left in the pressure window.
    pub fn cooldown_remaining(&self, now: Duration) -> Duration {
        if !self.is_enabled() {
            return Duration::ZERO;
        }
        self.cooldown_end
            .map(|end| end.saturating_sub(now))
            .unwrap_or(Duration::ZERO)
    }

    /// End of the current or last pressure window, `None` when disabled.
    pub fn cooldown_end(&self) -> Option<Duration> {
        if self.is_enabled() {
            self.cooldown_end
        } else {
            None
        }
    }

    /// Number of bursts detected.
    pub fn pressure_events(&self) -> u64 {
        self.pressure_events
    }

    /// Last reading in bytes.
    pub fn last_usage(&self) -> Option<u64> {
        self.last.map(|l| l.usage_bytes)
    }

    /// Permanently turns the detector off.
    pub fn disable(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.disabled_reason.is_none() {
            log::warn!("MemoryPressure: detection disabled: {reason}");
        }
        self.cooldown_end = None;
        self.disabled_reason = Some(reason);
    }

    /// Returns `false` once [`MemoryPressureDetector::disable`] was called.
    pub fn is_enabled(&self) -> bool {
        self.disabled_reason.is_none()
    }

    /// Why the detector was disabled.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    /// Current tuning.
    pub fn config(&self) -> &MemoryPressureConfig {
        &self.config
    }

    /// Replaces the tuning; history and any open window are kept.
    pub fn set_config(&mut self, config: MemoryPressureConfig) {
        self.config = config;
    }
}

impl Default for MemoryPressureDetector {
    fn default() -> Self {
        Self::new(MemoryPressureConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: u64 = 128 * BYTES_PER_MIB;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_first_sample_only_primes() {
        let mut detector = MemoryPressureDetector::default();
        assert!(!detector.on_sample(4 * THRESHOLD, ms(0)));
        assert_eq!(detector.last_usage(), Some(4 * THRESHOLD));
    }

    #[test]
    fn test_growth_above_threshold_opens_window() {
        let mut detector = MemoryPressureDetector::default();
        detector.on_sample(0, ms(0));
        assert!(detector.on_sample(THRESHOLD + 1, ms(100)));

        assert!(detector.is_under_pressure(ms(2099)));
        assert!(!detector.is_under_pressure(ms(2100)));
        assert_eq!(detector.cooldown_remaining(ms(1100)), ms(1000));
        assert_eq!(detector.pressure_events(), 1);
    }

    #[test]
    fn test_growth_equal_to_threshold_is_ignored() {
        let mut detector = MemoryPressureDetector::default();
        detector.on_sample(0, ms(0));
        assert!(!detector.on_sample(THRESHOLD, ms(100)));
    }

    #[test]
    fn test_shrinking_usage_is_not_growth() {
        let mut detector = MemoryPressureDetector::default();
        detector.on_sample(4 * THRESHOLD, ms(0));
        assert!(!detector.on_sample(0, ms(100)));
        // Baseline moved down, so a jump back up counts
        assert!(detector.on_sample(2 * THRESHOLD, ms(200)));
    }

    #[test]
    fn test_stale_timestamp_is_not_evaluated() {
        let mut detector = MemoryPressureDetector::default();
        detector.on_sample(0, ms(100));
        assert!(!detector.on_sample(4 * THRESHOLD, ms(100)));
        assert_eq!(detector.last_usage(), Some(4 * THRESHOLD));
    }

    #[test]
    fn test_disabled_never_reports_pressure() {
        let mut detector = MemoryPressureDetector::default();
        detector.on_sample(0, ms(0));
        detector.on_sample(THRESHOLD + 1, ms(100));
        detector.disable("sampler fault");

        assert!(!detector.is_enabled());
        assert!(!detector.is_under_pressure(ms(200)));
        assert!(!detector.on_sample(10 * THRESHOLD, ms(300)));
        assert_eq!(detector.disabled_reason(), Some("sampler fault"));
    }
}
