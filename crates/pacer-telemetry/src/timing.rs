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

//! Frame and tick timing.

use crate::delta::DeltaClock;
use crate::metrics::TimingTracker;
use serde::Serialize;
use std::time::Duration;

/// Window of the slow-frame percentile exposed in summaries.
const SLOW_FRAME_PERCENTILE: f64 = 99.0;

/// Point-in-time view of the timing windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimingSummary {
    /// Mean frame duration over the frame window.
    pub frame_avg_ms: f64,
    /// 99th percentile frame duration (the slowest 1%).
    pub frame_p99_ms: f64,
    /// Most recent frame duration.
    pub last_frame_ms: f64,
    /// Mean host-reported tick duration (processing time) over the tick window.
    pub tick_avg_ms: f64,
    /// Mean interval between tick boundaries over the tick window.
    pub tick_interval_avg_ms: f64,
    /// Retained frame samples.
    pub frame_samples: usize,
    /// Retained host-reported tick samples.
    pub tick_samples: usize,
    /// Retained tick interval samples.
    pub tick_interval_samples: usize,
}

/// Frame and tick trackers with their delta clocks.
///
/// Tick boundaries and host-reported tick durations are kept apart: the
/// interval between two [`mark_tick`](TimingMonitor::mark_tick) calls is the
/// tick period, while [`record_tick`](TimingMonitor::record_tick) carries the
/// time the host spent processing a tick.
#[derive(Debug, Clone)]
pub struct TimingMonitor {
    frame_clock: DeltaClock,
    tick_clock: DeltaClock,
    frames: TimingTracker,
    ticks: TimingTracker,
    tick_intervals: TimingTracker,
}

impl TimingMonitor {
    /// Creates a monitor with the given window sizes.
    pub fn new(frame_window: usize, tick_window: usize) -> Self {
        Self {
            frame_clock: DeltaClock::new(),
            tick_clock: DeltaClock::new(),
            frames: TimingTracker::new(frame_window),
            ticks: TimingTracker::new(tick_window),
            tick_intervals: TimingTracker::new(tick_window),
        }
    }

    /// Marks a frame boundary and records the elapsed time since the previous
    /// one. The very first call only sets the baseline and returns `None`.
    pub fn mark_frame(&mut self, now: Duration) -> Option<f64> {
        let primed = self.frame_clock.has_baseline();
        let sample = self.frame_clock.elapsed_ms(now);
        if primed && self.frames.record(sample) {
            Some(sample)
        } else {
            None
        }
    }

    /// Marks a tick boundary and records the interval since the previous one
    /// in the tick interval window. Same contract as [`TimingMonitor::mark_frame`].
    pub fn mark_tick(&mut self, now: Duration) -> Option<f64> {
        let primed = self.tick_clock.has_baseline();
        let sample = self.tick_clock.elapsed_ms(now);
        if primed && self.tick_intervals.record(sample) {
            Some(sample)
        } else {
            None
        }
    }

    /// Records an externally measured frame duration.
    pub fn record_frame(&mut self, sample_ms: f64) -> bool {
        self.frames.record(sample_ms)
    }

    /// Records a tick processing time measured by the host.
    pub fn record_tick(&mut self, sample_ms: f64) -> bool {
        self.ticks.record(sample_ms)
    }

    /// The frame window.
    pub fn frames(&self) -> &TimingTracker {
        &self.frames
    }

    /// Host-reported tick durations.
    pub fn ticks(&self) -> &TimingTracker {
        &self.ticks
    }

    /// Intervals between tick boundaries.
    pub fn tick_intervals(&self) -> &TimingTracker {
        &self.tick_intervals
    }

    /// Rebuilds the windows if their sizes changed. Samples are dropped on resize.
    pub fn resize(&mut self, frame_window: usize, tick_window: usize) {
        if self.frames.capacity() != frame_window.max(1) {
            log::debug!("TimingMonitor: frame window resized to {frame_window}");
            self.frames = TimingTracker::new(frame_window);
        }
        if self.ticks.capacity() != tick_window.max(1) {
            log::debug!("TimingMonitor: tick window resized to {tick_window}");
            self.ticks = TimingTracker::new(tick_window);
            self.tick_intervals = TimingTracker::new(tick_window);
        }
    }

    /// Clears both windows and both baselines.
    pub fn reset(&mut self) {
        self.frame_clock.reset();
        self.tick_clock.reset();
        self.frames.reset();
        self.ticks.reset();
        self.tick_intervals.reset();
    }

    /// Summarizes both windows.
    pub fn summary(&self) -> TimingSummary {
        TimingSummary {
            frame_avg_ms: self.frames.average(),
            frame_p99_ms: self.frames.percentile(SLOW_FRAME_PERCENTILE),
            last_frame_ms: self.frames.latest().unwrap_or(0.0),
            tick_avg_ms: self.ticks.average(),
            tick_interval_avg_ms: self.tick_intervals.average(),
            frame_samples: self.frames.count(),
            tick_samples: self.ticks.count(),
            tick_interval_samples: self.tick_intervals.count(),
        }
    }
}

impl Default for TimingMonitor {
    fn default() -> Self {
        Self::new(120, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_only_primes() {
        let mut monitor = TimingMonitor::default();
        assert_eq!(monitor.mark_frame(Duration::from_millis(5)), None);
        assert_eq!(monitor.mark_frame(Duration::from_millis(21)), Some(16.0));
        assert_eq!(monitor.frames().count(), 1);
    }

    #[test]
    fn test_tick_marks_are_independent() {
        let mut monitor = TimingMonitor::default();
        monitor.mark_frame(Duration::ZERO);
        assert_eq!(monitor.mark_tick(Duration::from_millis(10)), None);
        assert_eq!(monitor.mark_tick(Duration::from_millis(60)), Some(50.0));
        assert_eq!(monitor.frames().count(), 0);
    }

    #[test]
    fn test_tick_marks_and_reported_durations_stay_apart() {
        let mut monitor = TimingMonitor::default();
        for i in 0..10u64 {
            monitor.record_tick(5.0);
            monitor.mark_tick(Duration::from_millis(50 * i));
        }

        let summary = monitor.summary();
        assert_eq!(summary.tick_samples, 10);
        assert_eq!(summary.tick_avg_ms, 5.0);
        assert_eq!(summary.tick_interval_samples, 9);
        assert_eq!(summary.tick_interval_avg_ms, 50.0);
    }

    #[test]
    fn test_summary() {
        let mut monitor = TimingMonitor::new(4, 4);
        for ms in [10.0, 20.0, 30.0, 40.0] {
            monitor.record_frame(ms);
        }
        monitor.record_tick(50.0);

        let summary = monitor.summary();
        assert_eq!(summary.frame_avg_ms, 25.0);
        assert_eq!(summary.frame_p99_ms, 40.0);
        assert_eq!(summary.last_frame_ms, 40.0);
        assert_eq!(summary.tick_avg_ms, 50.0);
        assert_eq!(summary.frame_samples, 4);
    }

    #[test]
    fn test_resize_drops_samples_only_when_changed() {
        let mut monitor = TimingMonitor::new(4, 4);
        monitor.record_frame(10.0);
        monitor.resize(4, 8);
        assert_eq!(monitor.frames().count(), 1);
        monitor.resize(2, 8);
        assert_eq!(monitor.frames().count(), 0);
        assert_eq!(monitor.frames().capacity(), 2);
    }
}
