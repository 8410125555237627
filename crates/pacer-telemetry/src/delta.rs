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

//! Timestamp-to-duration conversion.

use pacer_core::duration_to_ms;
use std::time::Duration;

/// Turns successive timestamps into elapsed-time samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaClock {
    previous: Option<Duration>,
}

impl DeltaClock {
    /// Creates a clock with no baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `now` as the baseline for the next measurement.
    pub fn mark(&mut self, now: Duration) {
        self.previous = Some(now);
    }

    /// Returns the milliseconds elapsed since the previous mark and moves the
    /// baseline to `now`.
    ///
    /// Without a baseline the result is `0.0`. A timestamp earlier than the
    /// baseline also yields `0.0`.
    pub fn elapsed_ms(&mut self, now: Duration) -> f64 {
        let elapsed = self
            .previous
            .map(|previous| now.saturating_sub(previous))
            .unwrap_or(Duration::ZERO);
        self.previous = Some(now);
        duration_to_ms(elapsed)
    }

    /// Returns `true` once a baseline has been recorded.
    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    /// Drops the baseline.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
