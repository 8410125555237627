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

//! Dual-rate token bucket.

use std::time::Duration;

/// Continuous-refill token bucket with a normal and a throttled rate.
///
/// The active rate is both the refill speed (tokens per second) and the
/// capacity. Refill is lazy: it happens on every query. Switching to the
/// throttled mode does not drop tokens immediately; the next refill caps
/// them at the lower capacity.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    normal_rate: f64,
    throttled_rate: f64,
    tokens: f64,
    last_refill: Duration,
    throttled: bool,
}

impl TokenBucket {
    /// Creates a full bucket in normal mode.
    pub fn new(normal_rate: f64, throttled_rate: f64, now: Duration) -> Self {
        Self {
            normal_rate,
            throttled_rate,
            tokens: normal_rate,
            last_refill: now,
            throttled: false,
        }
    }

    fn refill(&mut self, now: Duration) {
        let elapsed = now.saturating_sub(self.last_refill).as_secs_f64();
        let rate = self.active_rate();
        self.tokens = (self.tokens + elapsed * rate).min(rate);
        self.last_refill = self.last_refill.max(now);
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self, now: Duration) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available at `now`.
    pub fn tokens(&mut self, now: Duration) -> f64 {
        self.refill(now);
        self.tokens
    }

    /// Selects the throttled or the normal rate.
    pub fn set_throttled(&mut self, throttled: bool) {
        if self.throttled != throttled {
            log::trace!("TokenBucket: throttled={throttled}");
        }
        self.throttled = throttled;
    }

    /// Returns `true` in throttled mode.
    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    /// Rate (and capacity) of the current mode.
    pub fn active_rate(&self) -> f64 {
        if self.throttled {
            self.throttled_rate
        } else {
            self.normal_rate
        }
    }

    /// Changes both rates, then refills against the new capacity.
    pub fn update_rates(&mut self, normal_rate: f64, throttled_rate: f64, now: Duration) {
        // Settle the time elapsed so far at the old rate first
        self.refill(now);
        self.normal_rate = normal_rate;
        self.throttled_rate = throttled_rate;
        self.refill(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_bucket_then_empty() {
        let mut bucket = TokenBucket::new(60.0, 15.0, Duration::ZERO);
        let granted = (0..61).filter(|_| bucket.try_acquire(Duration::ZERO)).count();
        assert_eq!(granted, 60);
    }

    #[test]
    fn test_refills_after_one_second() {
        let mut bucket = TokenBucket::new(60.0, 15.0, Duration::ZERO);
        for _ in 0..60 {
            assert!(bucket.try_acquire(Duration::ZERO));
        }
        assert!(!bucket.try_acquire(Duration::ZERO));

        let later = Duration::from_secs(1);
        let granted = (0..61).filter(|_| bucket.try_acquire(later)).count();
        assert_eq!(granted, 60);
    }

    #[test]
    fn test_partial_refill() {
        let mut bucket = TokenBucket::new(60.0, 15.0, Duration::ZERO);
        for _ in 0..60 {
            bucket.try_acquire(Duration::ZERO);
        }
        // 100ms at 60/s is 6 tokens
        let tokens = bucket.tokens(Duration::from_millis(100));
        assert!((tokens - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_throttled_mode_caps_tokens() {
        let mut bucket = TokenBucket::new(60.0, 15.0, Duration::ZERO);
        bucket.set_throttled(true);
        assert_eq!(bucket.active_rate(), 15.0);
        assert_eq!(bucket.tokens(Duration::ZERO), 15.0);

        let granted = (0..20).filter(|_| bucket.try_acquire(Duration::ZERO)).count();
        assert_eq!(granted, 15);
    }

    #[test]
    fn test_tokens_never_exceed_capacity() {
        let mut bucket = TokenBucket::new(60.0, 15.0, Duration::ZERO);
        assert_eq!(bucket.tokens(Duration::from_secs(100)), 60.0);
        bucket.set_throttled(false);
        bucket.update_rates(30.0, 10.0, Duration::from_secs(101));
        assert_eq!(bucket.tokens(Duration::from_secs(101)), 30.0);
    }

    #[test]
    fn test_time_going_backwards_adds_nothing() {
        let mut bucket = TokenBucket::new(2.0, 1.0, Duration::from_secs(5));
        bucket.try_acquire(Duration::from_secs(5));
        bucket.try_acquire(Duration::from_secs(5));
        assert!(!bucket.try_acquire(Duration::from_secs(4)));
    }
}
