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

//! Quality levels published by the level governor.

use serde::{Deserialize, Serialize};

/// Degradation ladder, ordered from best to most degraded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum QualityLevel {
    /// No shedding.
    #[default]
    Full,
    /// Moderate shedding.
    Reduced,
    /// Maximum shedding.
    Minimal,
}

impl QualityLevel {
    /// One step more degraded, or `None` at [`QualityLevel::Minimal`].
    pub fn degraded(self) -> Option<Self> {
        match self {
            Self::Full => Some(Self::Reduced),
            Self::Reduced => Some(Self::Minimal),
            Self::Minimal => None,
        }
    }

    /// One step less degraded, or `None` at [`QualityLevel::Full`].
    pub fn restored(self) -> Option<Self> {
        match self {
            Self::Full => None,
            Self::Reduced => Some(Self::Full),
            Self::Minimal => Some(Self::Reduced),
        }
    }

    /// Compact encoding used for atomic publication.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`QualityLevel::as_u8`]; out-of-range values decode as `Minimal`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Full,
            1 => Self::Reduced,
            _ => Self::Minimal,
        }
    }

    /// Returns the level name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::Reduced => "Reduced",
            Self::Minimal => "Minimal",
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_moves_one_step() {
        assert_eq!(QualityLevel::Full.degraded(), Some(QualityLevel::Reduced));
        assert_eq!(QualityLevel::Reduced.degraded(), Some(QualityLevel::Minimal));
        assert_eq!(QualityLevel::Minimal.degraded(), None);
        assert_eq!(QualityLevel::Minimal.restored(), Some(QualityLevel::Reduced));
        assert_eq!(QualityLevel::Full.restored(), None);
    }

    #[test]
    fn test_u8_encoding() {
        for level in [QualityLevel::Full, QualityLevel::Reduced, QualityLevel::Minimal] {
            assert_eq!(QualityLevel::from_u8(level.as_u8()), level);
        }
        assert!(QualityLevel::Full < QualityLevel::Minimal);
    }
}
