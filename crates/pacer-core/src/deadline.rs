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

//! Lock-free cooldown deadlines.

use crate::clock::saturating_nanos;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const INACTIVE: u64 = 0;

/// A cooldown end point readable from any thread.
///
/// The primary thread arms it; consumers only ask whether it is still
/// pending. A deadline of zero means "never armed".
#[derive(Debug, Default)]
pub struct AtomicDeadline {
    end_nanos: AtomicU64,
}

impl AtomicDeadline {
    /// Creates an inactive deadline.
    pub const fn new() -> Self {
        Self {
            end_nanos: AtomicU64::new(INACTIVE),
        }
    }

    /// Sets the deadline to `end`, replacing any earlier value.
    pub fn set(&self, end: Duration) {
        self.end_nanos.store(saturating_nanos(end), Ordering::Release);
    }

    /// Publishes an optional deadline; `None` deactivates it.
    pub fn store(&self, end: Option<Duration>) {
        match end {
            Some(end) => self.set(end),
            None => self.clear(),
        }
    }

    /// Deactivates the deadline.
    pub fn clear(&self) {
        self.end_nanos.store(INACTIVE, Ordering::Release);
    }

    /// Returns `true` while `now` is strictly before the deadline.
    pub fn is_pending(&self, now: Duration) -> bool {
        saturating_nanos(now) < self.end_nanos.load(Ordering::Acquire)
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self, now: Duration) -> Duration {
        let end = self.end_nanos.load(Ordering::Acquire);
        Duration::from_nanos(end.saturating_sub(saturating_nanos(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_pending_until_end() {
        let deadline = AtomicDeadline::new();
        assert!(!deadline.is_pending(Duration::ZERO));

        deadline.set(Duration::from_millis(750));
        assert!(deadline.is_pending(Duration::from_millis(749)));
        assert!(!deadline.is_pending(Duration::from_millis(750)));
        assert_eq!(
            deadline.remaining(Duration::from_millis(500)),
            Duration::from_millis(250)
        );
        assert_eq!(deadline.remaining(Duration::from_secs(2)), Duration::ZERO);
    }

    #[test]
    fn test_deadline_clear() {
        let deadline = AtomicDeadline::new();
        deadline.store(Some(Duration::from_secs(1)));
        deadline.store(None);
        assert!(!deadline.is_pending(Duration::ZERO));
    }
}
