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

//! Optimization presets.

use crate::config::GovernorConfig;
use serde::{Deserialize, Serialize};

/// A named bundle of settings for a usage pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationProfile {
    /// Frame rate first: sparse HUD refresh, generous background budget.
    Competitive,
    /// Balanced for travelling through the world.
    Exploration,
    /// Minimal background work.
    Battery,
    /// User-defined settings; applying it changes nothing.
    #[default]
    Custom,
}

impl OptimizationProfile {
    /// Every profile, in presentation order.
    pub const ALL: [OptimizationProfile; 4] = [
        OptimizationProfile::Competitive,
        OptimizationProfile::Exploration,
        OptimizationProfile::Battery,
        OptimizationProfile::Custom,
    ];

    /// Parses a profile name, case-insensitively. Unknown names map to `Custom`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
            .unwrap_or(OptimizationProfile::Custom)
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            OptimizationProfile::Competitive => "competitive",
            OptimizationProfile::Exploration => "exploration",
            OptimizationProfile::Battery => "battery",
            OptimizationProfile::Custom => "custom",
        }
    }

    /// One-line description.
    pub fn description(self) -> &'static str {
        match self {
            OptimizationProfile::Competitive => "High frame rate priority",
            OptimizationProfile::Exploration => "Balanced for world travel",
            OptimizationProfile::Battery => "Power saving",
            OptimizationProfile::Custom => "User-defined settings",
        }
    }

    fn preset(self) -> Option<(u32, u64, bool)> {
        // (hud interval ticks, deferred budget ms, adaptive builds)
        match self {
            OptimizationProfile::Competitive => Some((2, 10, true)),
            OptimizationProfile::Exploration => Some((1, 5, true)),
            OptimizationProfile::Battery => Some((1, 3, true)),
            OptimizationProfile::Custom => None,
        }
    }

    /// Writes this profile's preset into `config`.
    pub fn apply(self, config: &mut GovernorConfig) {
        let Some((hud_interval, deferred_ms, adaptive_builds)) = self.preset() else {
            return;
        };
        config.profile = self;
        config.hud.interval_ticks = hud_interval;
        config.deferred.budget_ms = deferred_ms;
        config.adaptive_builds.enabled = adaptive_builds;
        log::info!("OptimizationProfile: applied '{}'", self.name());
    }
}

impl std::fmt::Display for OptimizationProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
