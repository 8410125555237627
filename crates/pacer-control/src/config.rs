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

//! Governor configuration.
//!
//! Every section uses `#[serde(default)]`, so a JSON document only needs the
//! keys it wants to change. Unknown keys are ignored. Values outside their
//! valid range are clamped by [`GovernorConfig::sanitized`], which the
//! loaders and the service always apply.

use crate::budget::{BLOCK_ENTITY_UPDATES, CHUNK_BUILDS};
use crate::profile::OptimizationProfile;
use pacer_telemetry::{MemoryPressureConfig, SpikeConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Errors raised while loading a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The document is not valid configuration JSON.
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read governor config: {e}"),
            ConfigError::Parse(e) => write!(f, "invalid governor config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Frame pacing: EMA spike detection and the throttle window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramePacingConfig {
    /// Enables spike detection.
    pub enabled: bool,
    /// EMA smoothing factor.
    pub alpha: f64,
    /// A frame strictly slower than this is a spike.
    pub spike_threshold_ms: f64,
    /// Throttle window opened by each spike.
    pub cooldown_ms: u64,
    /// Target frame time, also the initial EMA value.
    pub target_frame_ms: f64,
}

impl Default for FramePacingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.3,
            spike_threshold_ms: 28.0,
            cooldown_ms: 750,
            target_frame_ms: 16.6,
        }
    }
}

impl FramePacingConfig {
    /// Detector tuning derived from this section.
    pub fn spike_config(&self) -> SpikeConfig {
        SpikeConfig {
            alpha: self.alpha,
            threshold_ms: self.spike_threshold_ms,
            cooldown: Duration::from_millis(self.cooldown_ms),
            baseline_ms: self.target_frame_ms,
        }
    }
}

/// Hysteretic quality ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Enables the ladder. When disabled the level stays `Full`.
    pub enabled: bool,
    /// Target frame rate the smoothed signal is compared against.
    pub target_rate: f64,
    /// Smoothing factor for the signal.
    pub alpha: f64,
    /// Ticks between two transitions.
    pub cooldown_ticks: u32,
    /// Degrade below `target_rate * degrade_ratio`.
    pub degrade_ratio: f64,
    /// Restore above `target_rate * restore_ratio`.
    pub restore_ratio: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_rate: 60.0,
            alpha: 0.08,
            cooldown_ticks: 40,
            degrade_ratio: 0.85,
            restore_ratio: 1.05,
        }
    }
}

/// Dual-rate limiter for geometry rebuilds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    /// Enables limiting. When disabled every acquisition is granted.
    pub enabled: bool,
    /// Tokens per second (and capacity) in normal mode.
    pub normal_rate: f64,
    /// Tokens per second (and capacity) while throttled.
    pub throttled_rate: f64,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normal_rate: 60.0,
            throttled_rate: 15.0,
        }
    }
}

/// Memory growth detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Enables detection.
    pub enabled: bool,
    /// Growth between two samples that counts as a burst, in MiB.
    pub growth_threshold_mb: u64,
    /// Pressure window opened by a burst.
    pub cooldown_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            growth_threshold_mb: 128,
            cooldown_ms: 2000,
        }
    }
}

impl MemoryConfig {
    /// Detector tuning derived from this section.
    pub fn pressure_config(&self) -> MemoryPressureConfig {
        MemoryPressureConfig {
            growth_threshold_bytes: self.growth_threshold_mb.saturating_mul(BYTES_PER_MIB),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }
}

/// One per-tick allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Grants per tick.
    pub max: u32,
    /// When disabled the budget always grants.
    pub enabled: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max: 0,
            enabled: true,
        }
    }
}

/// Cooperative deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferredConfig {
    /// Enables the scheduler. When disabled tasks queue up but never run.
    pub enabled: bool,
    /// Wall-clock budget per tick, clamped to `1..=20` ms.
    pub budget_ms: u64,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            budget_ms: 5,
        }
    }
}

/// Periodic cache cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enables the timer. Manual cleanup always works.
    pub enabled: bool,
    /// Seconds between two cleanups.
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_interval_secs: 30,
        }
    }
}

/// HUD refresh gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    /// When disabled the HUD may refresh every tick.
    pub enabled: bool,
    /// Refresh once every this many ticks.
    pub interval_ticks: u32,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ticks: 4,
        }
    }
}

/// Stutter smoothing window. Uses the frame pacing spike threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StutterConfig {
    /// Enables the window.
    pub enabled: bool,
    /// Window length.
    pub window_ms: u64,
}

impl Default for StutterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 1500,
        }
    }
}

/// Frame-time variance deferral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceConfig {
    /// Enables the monitor.
    pub enabled: bool,
    /// Standard deviation above which deferral starts.
    pub threshold_ms: f64,
    /// Frames deferral lasts after the last unstable reading.
    pub deferral_ticks: u32,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_ms: 5.0,
            deferral_ticks: 2,
        }
    }
}

/// Adaptive per-tick geometry build budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveBuildConfig {
    /// When disabled the budget is pinned at `max_per_tick`.
    pub enabled: bool,
    /// Upper bound of the budget.
    pub max_per_tick: u32,
    /// A frame slower than this lowers the budget.
    pub stutter_ms: f64,
    /// A frame faster than this raises the budget.
    pub recovery_ms: f64,
    /// Frames between two adjustments.
    pub adjust_every: u32,
}

impl Default for AdaptiveBuildConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_tick: 8,
            stutter_ms: 30.0,
            recovery_ms: 16.0,
            adjust_every: 10,
        }
    }
}

/// Complete governor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Master switch. When off, ticks are no-ops and every permission grants.
    pub enabled: bool,
    /// Profile last applied through [`GovernorConfig::apply_profile`].
    pub profile: OptimizationProfile,
    /// Frame timing window.
    pub frame_window: usize,
    /// Tick timing window.
    pub tick_window: usize,
    /// Capacity of the cross-thread event channel.
    pub event_buffer_size: usize,
    /// Frame pacing.
    pub frame_pacing: FramePacingConfig,
    /// Quality ladder.
    pub level: LevelConfig,
    /// Rebuild rate limiter.
    pub rebuild: RebuildConfig,
    /// Memory pressure.
    pub memory: MemoryConfig,
    /// Per-tick budgets by name.
    pub budgets: BTreeMap<String, BudgetConfig>,
    /// Deferred scheduler.
    pub deferred: DeferredConfig,
    /// Cache cleanup timer.
    pub caches: CacheConfig,
    /// HUD gate.
    pub hud: HudConfig,
    /// Stutter window.
    pub stutter: StutterConfig,
    /// Variance deferral.
    pub variance: VarianceConfig,
    /// Adaptive build budget.
    pub adaptive_builds: AdaptiveBuildConfig,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        let mut budgets = BTreeMap::new();
        budgets.insert(
            BLOCK_ENTITY_UPDATES.to_string(),
            BudgetConfig {
                max: 50,
                enabled: true,
            },
        );
        budgets.insert(
            CHUNK_BUILDS.to_string(),
            BudgetConfig {
                max: 4,
                enabled: true,
            },
        );

        Self {
            enabled: true,
            profile: OptimizationProfile::Custom,
            frame_window: 120,
            tick_window: 200,
            event_buffer_size: 256,
            frame_pacing: FramePacingConfig::default(),
            level: LevelConfig::default(),
            rebuild: RebuildConfig::default(),
            memory: MemoryConfig::default(),
            budgets,
            deferred: DeferredConfig::default(),
            caches: CacheConfig::default(),
            hud: HudConfig::default(),
            stutter: StutterConfig::default(),
            variance: VarianceConfig::default(),
            adaptive_builds: AdaptiveBuildConfig::default(),
        }
    }
}

impl GovernorConfig {
    /// Parses a JSON document and clamps it.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Reads and parses a JSON file, then clamps it.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Applies a preset. [`OptimizationProfile::Custom`] changes nothing.
    pub fn apply_profile(&mut self, profile: OptimizationProfile) {
        profile.apply(self);
    }

    /// Returns a copy with every out-of-range value clamped into range.
    ///
    /// Each clamp is logged once with `warn!`.
    pub fn sanitized(mut self) -> Self {
        clamp_field(&mut self.frame_window, 1, 10_000, "frame_window");
        clamp_field(&mut self.tick_window, 1, 10_000, "tick_window");
        clamp_field(&mut self.event_buffer_size, 1, 65_536, "event_buffer_size");

        let fp = &mut self.frame_pacing;
        clamp_field(&mut fp.alpha, 0.01, 1.0, "frame_pacing.alpha");
        clamp_field(&mut fp.spike_threshold_ms, 1.0, 1000.0, "frame_pacing.spike_threshold_ms");
        clamp_field(&mut fp.cooldown_ms, 0, 60_000, "frame_pacing.cooldown_ms");
        clamp_field(&mut fp.target_frame_ms, 1.0, 1000.0, "frame_pacing.target_frame_ms");

        let level = &mut self.level;
        clamp_field(&mut level.target_rate, 1.0, 1000.0, "level.target_rate");
        clamp_field(&mut level.alpha, 0.01, 1.0, "level.alpha");
        clamp_field(&mut level.degrade_ratio, 0.1, 1.0, "level.degrade_ratio");
        clamp_field(&mut level.restore_ratio, 1.0, 2.0, "level.restore_ratio");

        clamp_field(&mut self.rebuild.normal_rate, 0.0, 10_000.0, "rebuild.normal_rate");
        clamp_field(&mut self.rebuild.throttled_rate, 0.0, 10_000.0, "rebuild.throttled_rate");

        clamp_field(
            &mut self.memory.growth_threshold_mb,
            1,
            65_536,
            "memory.growth_threshold_mb",
        );
        clamp_field(&mut self.memory.cooldown_ms, 0, 60_000, "memory.cooldown_ms");

        clamp_field(&mut self.deferred.budget_ms, 1, 20, "deferred.budget_ms");
        clamp_field(
            &mut self.caches.cleanup_interval_secs,
            1,
            3600,
            "caches.cleanup_interval_secs",
        );
        clamp_field(&mut self.hud.interval_ticks, 1, 100, "hud.interval_ticks");
        clamp_field(&mut self.stutter.window_ms, 0, 60_000, "stutter.window_ms");

        clamp_field(&mut self.variance.threshold_ms, 0.1, 1000.0, "variance.threshold_ms");
        clamp_field(&mut self.variance.deferral_ticks, 0, 1000, "variance.deferral_ticks");

        let builds = &mut self.adaptive_builds;
        clamp_field(&mut builds.max_per_tick, 1, 1000, "adaptive_builds.max_per_tick");
        clamp_field(&mut builds.stutter_ms, 1.0, 1000.0, "adaptive_builds.stutter_ms");
        clamp_field(&mut builds.recovery_ms, 1.0, 1000.0, "adaptive_builds.recovery_ms");
        clamp_field(&mut builds.adjust_every, 1, 1000, "adaptive_builds.adjust_every");

        self
    }

    /// Cache cleanup period.
    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.caches.cleanup_interval_secs)
    }
}

/// Clamps `value` into `[min, max]`. NaN is treated as below range.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
fn clamp_field<T>(value: &mut T, min: T, max: T, field: &str)
where
    T: PartialOrd + Copy + Display,
{
    let clamped = if !(*value >= min) {
        min
    } else if !(*value <= max) {
        max
    } else {
        return;
    };
    log::warn!("GovernorConfig: {field}={value} out of range [{min}, {max}], using {clamped}");
    *value = clamped;
}
