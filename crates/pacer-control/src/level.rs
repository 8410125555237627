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

//! Hysteretic quality-level governor.
//!
//! The governor smooths a rate signal (frames per second) and walks a
//! three-step ladder. Two thresholds with a dead band between them and a
//! per-transition cooldown keep it from oscillating:
//!
//! - below `target * degrade_ratio`: one step towards `Minimal`,
//! - above `target * restore_ratio`: one step towards `Full`,
//! - in between: hold.

use crate::config::LevelConfig;
use pacer_core::QualityLevel;

/// A single step on the ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelTransition {
    /// Level before the step.
    pub from: QualityLevel,
    /// Level after the step.
    pub to: QualityLevel,
    /// Smoothed signal that caused it.
    pub signal: f64,
}

/// Three-state ladder driven once per tick.
#[derive(Debug, Clone)]
pub struct LevelGovernor {
    config: LevelConfig,
    level: QualityLevel,
    signal: f64,
    cooldown: u32,
}

impl LevelGovernor {
    /// Starts at `Full` with the signal seeded at the target.
    pub fn new(config: LevelConfig) -> Self {
        Self {
            signal: config.target_rate,
            config,
            level: QualityLevel::Full,
            cooldown: 0,
        }
    }

    /// Smooths `sample` into the signal and steps the ladder at most once.
    ///
    /// Non-finite samples are ignored.
    pub fn update(&mut self, sample: f64) -> Option<LevelTransition> {
        if !sample.is_finite() {
            return None;
        }
        let alpha = self.config.alpha;
        self.signal = alpha * sample + (1.0 - alpha) * self.signal;

        if self.cooldown > 0 {
            self.cooldown -= 1;
        }
        if self.cooldown > 0 {
            return None;
        }

        let next = if self.signal < self.degrade_threshold() {
            self.level.degraded()
        } else if self.signal > self.restore_threshold() {
            self.level.restored()
        } else {
            None
        }?;

        let transition = LevelTransition {
            from: self.level,
            to: next,
            signal: self.signal,
        };
        self.level = next;
        self.cooldown = self.config.cooldown_ticks;
        Some(transition)
    }

    /// Current level.
    pub fn level(&self) -> QualityLevel {
        self.level
    }

    /// Smoothed signal.
    pub fn signal(&self) -> f64 {
        self.signal
    }

    /// Ticks left before the next transition is allowed.
    pub fn cooldown_remaining(&self) -> u32 {
        self.cooldown
    }

    /// Signal below which the ladder degrades.
    pub fn degrade_threshold(&self) -> f64 {
        self.config.target_rate * self.config.degrade_ratio
    }

    /// Signal above which the ladder restores.
    pub fn restore_threshold(&self) -> f64 {
        self.config.target_rate * self.config.restore_ratio
    }

    /// Replaces the tuning; level, signal and cooldown are kept.
    pub fn set_config(&mut self, config: LevelConfig) {
        self.config = config;
    }

    /// Returns to `Full` with a fresh signal.
    pub fn reset(&mut self) {
        self.level = QualityLevel::Full;
        self.signal = self.config.target_rate;
        self.cooldown = 0;
    }
}

impl Default for LevelGovernor {
    fn default() -> Self {
        Self::new(LevelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(governor: &mut LevelGovernor, sample: f64, ticks: usize) -> Vec<LevelTransition> {
        (0..ticks).filter_map(|_| governor.update(sample)).collect()
    }

    #[test]
    fn test_sustained_low_rate_degrades_one_step_at_a_time() {
        let mut governor = LevelGovernor::default();
        let transitions = drive(&mut governor, 40.0, 200);

        let path: Vec<_> = transitions.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![
                (QualityLevel::Full, QualityLevel::Reduced),
                (QualityLevel::Reduced, QualityLevel::Minimal),
            ]
        );
        assert_eq!(governor.level(), QualityLevel::Minimal);
    }

    #[test]
    fn test_transitions_respect_cooldown() {
        let mut governor = LevelGovernor::default();
        let mut ticks_at_transition = Vec::new();
        for tick in 0..200 {
            if governor.update(40.0).is_some() {
                ticks_at_transition.push(tick);
            }
        }
        assert_eq!(ticks_at_transition.len(), 2);
        assert!(ticks_at_transition[1] - ticks_at_transition[0] >= 40);
    }

    #[test]
    fn test_recovery_never_skips_reduced() {
        let mut governor = LevelGovernor::default();
        drive(&mut governor, 40.0, 200);
        assert_eq!(governor.level(), QualityLevel::Minimal);

        let transitions = drive(&mut governor, 65.0, 400);
        let path: Vec<_> = transitions.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![
                (QualityLevel::Minimal, QualityLevel::Reduced),
                (QualityLevel::Reduced, QualityLevel::Full),
            ]
        );
    }

    #[test]
    fn test_signal_at_target_never_moves() {
        let mut governor = LevelGovernor::default();
        assert!(drive(&mut governor, 60.0, 500).is_empty());
        assert_eq!(governor.level(), QualityLevel::Full);
    }

    #[test]
    fn test_dead_band_holds_level() {
        let mut governor = LevelGovernor::default();
        drive(&mut governor, 40.0, 20);
        assert_eq!(governor.level(), QualityLevel::Reduced);
        // 55 sits between 51 and 63
        drive(&mut governor, 55.0, 500);
        assert_eq!(governor.level(), QualityLevel::Reduced);
    }

    #[test]
    fn test_thresholds() {
        let governor = LevelGovernor::default();
        assert!((governor.degrade_threshold() - 51.0).abs() < 1e-9);
        assert!((governor.restore_threshold() - 63.0).abs() < 1e-9);
    }
}
