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

//! Stutter smoothing window.

use std::time::Duration;

/// Opens a fixed smoothing window after a frame spike.
///
/// Unlike [`SpikeDetector`](crate::SpikeDetector), a spike inside an open
/// window does not restart it: the window always closes `window` after the
/// spike that opened it.
#[derive(Debug, Clone)]
pub struct StutterWindow {
    threshold_ms: f64,
    window: Duration,
    end: Option<Duration>,
    activations: u64,
}

impl StutterWindow {
    /// Creates a closed window.
    pub fn new(threshold_ms: f64, window: Duration) -> Self {
        Self {
            threshold_ms,
            window,
            end: None,
            activations: 0,
        }
    }

    /// Feeds a frame duration; returns whether smoothing is active afterwards.
    pub fn on_sample(&mut self, sample_ms: f64, now: Duration) -> bool {
        if self.is_smoothing(now) {
            return true;
        }
        if sample_ms.is_finite() && sample_ms > self.threshold_ms {
            self.end = Some(now + self.window);
            self.activations += 1;
            log::debug!(
                "StutterWindow: spike {:.1}ms > {:.1}ms, smoothing for {:?}",
                sample_ms,
                self.threshold_ms,
                self.window
            );
            return true;
        }
        false
    }

    /// Returns `true` while inside the window.
    pub fn is_smoothing(&self, now: Duration) -> bool {
        self.end.is_some_and(|end| now < end)
    }

    /// End of the current or last window.
    pub fn window_end(&self) -> Option<Duration> {
        self.end
    }

    /// How many windows were opened.
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Updates the spike threshold and window length.
    pub fn configure(&mut self, threshold_ms: f64, window: Duration) {
        self.threshold_ms = threshold_ms;
        self.window = window;
    }

    /// Closes any open window.
    pub fn reset(&mut self) {
        self.end = None;
    }
}
