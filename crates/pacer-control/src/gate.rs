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

//! Interval gate for HUD refreshes and the adaptive geometry build budget.

use crate::config::AdaptiveBuildConfig;

/// Nominal simulation tick length used for interval estimates.
pub const NOMINAL_TICK_MS: u32 = 50;

/// Allows a HUD refresh once every `interval` ticks.
#[derive(Debug, Clone)]
pub struct HudGate {
    interval: u32,
    counter: u64,
    refresh: bool,
}

impl HudGate {
    /// Creates an open gate. `interval` is clamped to at least 1.
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            counter: 0,
            refresh: true,
        }
    }

    /// Advances one tick and returns whether the HUD may refresh on it.
    pub fn on_tick(&mut self) -> bool {
        self.counter += 1;
        self.refresh = self.counter % u64::from(self.interval) == 0;
        self.refresh
    }

    /// Decision for the current tick.
    pub fn should_refresh(&self) -> bool {
        self.refresh
    }

    /// Changes the interval. Clamped to at least 1.
    pub fn set_interval(&mut self, interval: u32) {
        self.interval = interval.max(1);
    }

    /// Ticks between refreshes.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Rough wall-clock time between refreshes for a given tick length.
    pub fn approximate_interval_ms(&self, tick_ms: u32) -> u32 {
        self.interval.saturating_mul(tick_ms)
    }

    /// Restarts the count with the gate open.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.refresh = true;
    }
}

impl Default for HudGate {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Per-tick geometry build allowance that follows frame times.
///
/// Every `adjust_every` frames it looks at the latest frame: slower than
/// `stutter_ms` lowers the allowance by one (never below 1), faster than
/// `recovery_ms` raises it by one (never above `max_per_tick`).
#[derive(Debug, Clone)]
pub struct AdaptiveBuildBudget {
    config: AdaptiveBuildConfig,
    current: u32,
    frames_since_adjustment: u32,
}

impl AdaptiveBuildBudget {
    /// Starts at the maximum.
    pub fn new(config: AdaptiveBuildConfig) -> Self {
        let max = config.max_per_tick.max(1);
        Self {
            config,
            current: max,
            frames_since_adjustment: 0,
        }
    }

    /// Feeds a frame time and returns the allowance.
    pub fn on_frame(&mut self, frame_ms: f64) -> u32 {
        let max = self.config.max_per_tick.max(1);
        if !self.config.enabled {
            self.current = max;
            return self.current;
        }

        self.frames_since_adjustment += 1;
        if self.frames_since_adjustment >= self.config.adjust_every.max(1) {
            if frame_ms > self.config.stutter_ms {
                self.current = self.current.saturating_sub(1).max(1);
                log::debug!(
                    "AdaptiveBuildBudget: lowered to {} ({frame_ms:.1}ms frame)",
                    self.current
                );
            } else if frame_ms < self.config.recovery_ms && self.current < max {
                self.current += 1;
                log::debug!("AdaptiveBuildBudget: raised to {}", self.current);
            }
            self.frames_since_adjustment = 0;
        }
        self.current
    }

    /// Current allowance.
    pub fn budget(&self) -> u32 {
        self.current
    }

    /// Replaces the tuning. A changed maximum resets the allowance to it.
    pub fn configure(&mut self, config: AdaptiveBuildConfig) {
        if config.max_per_tick != self.config.max_per_tick || !config.enabled {
            self.current = config.max_per_tick.max(1);
        }
        self.current = self.current.min(config.max_per_tick.max(1));
        self.config = config;
    }
}

impl Default for AdaptiveBuildBudget {
    fn default() -> Self {
        Self::new(AdaptiveBuildConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hud_gate_every_fourth_tick() {
        let mut gate = HudGate::new(4);
        assert!(gate.should_refresh());
        let pattern: Vec<bool> = (0..8).map(|_| gate.on_tick()).collect();
        assert_eq!(
            pattern,
            vec![false, false, false, true, false, false, false, true]
        );
        assert_eq!(gate.approximate_interval_ms(NOMINAL_TICK_MS), 200);
    }

    #[test]
    fn test_hud_gate_interval_one_always_refreshes() {
        let mut gate = HudGate::new(0);
        assert_eq!(gate.interval(), 1);
        assert!((0..10).all(|_| gate.on_tick()));
    }

    #[test]
    fn test_build_budget_lowers_on_stutter_and_recovers() {
        let mut budget = AdaptiveBuildBudget::default();
        assert_eq!(budget.budget(), 8);

        // Only every tenth frame counts
        for _ in 0..30 {
            budget.on_frame(45.0);
        }
        assert_eq!(budget.budget(), 5);

        for _ in 0..20 {
            budget.on_frame(10.0);
        }
        assert_eq!(budget.budget(), 7);
    }

    #[test]
    fn test_build_budget_floor_and_dead_band() {
        let mut budget = AdaptiveBuildBudget::new(AdaptiveBuildConfig {
            max_per_tick: 2,
            adjust_every: 1,
            ..AdaptiveBuildConfig::default()
        });
        for _ in 0..10 {
            budget.on_frame(100.0);
        }
        assert_eq!(budget.budget(), 1);
        // 20ms is between recovery and stutter: hold
        budget.on_frame(20.0);
        assert_eq!(budget.budget(), 1);
    }

    #[test]
    fn test_disabled_pins_to_max() {
        let mut budget = AdaptiveBuildBudget::default();
        for _ in 0..30 {
            budget.on_frame(45.0);
        }
        budget.configure(AdaptiveBuildConfig {
            enabled: false,
            ..AdaptiveBuildConfig::default()
        });
        assert_eq!(budget.on_frame(45.0), 8);
    }
}
