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

//! Diagnostics snapshot of the whole governor.

use crate::budget::BudgetStatus;
use crate::cache::CacheStatus;
use crate::profile::OptimizationProfile;
use crate::supervisor::SubsystemStatus;
use pacer_core::QualityLevel;
use pacer_telemetry::TimingSummary;
use serde::Serialize;

/// Everything an overlay or a log line might want to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernorSnapshot {
    /// Ticks run so far.
    pub tick: u64,
    /// Master switch.
    pub enabled: bool,
    /// Last applied preset.
    pub profile: OptimizationProfile,
    /// Frame and tick windows.
    pub timing: TimingSummary,
    /// Smoothed frame time.
    pub frame_ema_ms: f64,
    /// Spikes since the last counter reset.
    pub spike_count: u64,
    /// Frame-pacing throttle state.
    pub throttling: bool,
    /// Time left in the throttle window.
    pub throttle_remaining_ms: f64,
    /// Quality level.
    pub level: QualityLevel,
    /// Smoothed frame rate driving the level.
    pub level_signal: f64,
    /// Rebuild tokens, `None` if the bucket was busy.
    pub rebuild_tokens: Option<f64>,
    /// Tasks waiting.
    pub queue_length: usize,
    /// Deferred gate.
    pub world_ready: bool,
    /// Memory pressure state.
    pub memory_pressure: bool,
    /// Time left in the pressure window.
    pub memory_pressure_remaining_ms: f64,
    /// `false` after a sampler fault.
    pub memory_detection_enabled: bool,
    /// HUD gate decision.
    pub hud_refresh: bool,
    /// Variance deferral.
    pub deferral_active: bool,
    /// Stutter window.
    pub smoothing: bool,
    /// Adaptive geometry build allowance.
    pub adaptive_build_budget: u32,
    /// Per-tick budgets.
    pub budgets: Vec<BudgetStatus>,
    /// Registered caches.
    pub caches: Vec<CacheStatus>,
    /// Health of supervised steps.
    pub subsystems: Vec<SubsystemStatus>,
}

impl GovernorSnapshot {
    /// Serializes to compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// One-line human summary for logs.
    pub fn summary_line(&self) -> String {
        format!(
            "level={} frame={:.1}ms p99={:.1}ms throttling={} pressure={} queue={}",
            self.level,
            self.timing.frame_avg_ms,
            self.timing.frame_p99_ms,
            self.throttling,
            self.memory_pressure,
            self.queue_length
        )
    }
}
