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

//! # Pacer Core
//!
//! Foundational crate containing the contracts, clocks, and shared primitives
//! that every layer of the resource governor builds on.
//!
//! Nothing here makes decisions. Signal detection lives in `pacer-telemetry`
//! and budget distribution in `pacer-control`.

#![warn(missing_docs)]

pub mod cache;
pub mod clock;
pub mod deadline;
pub mod error;
pub mod level;
pub mod sampler;
pub mod task;

pub use cache::CacheHandle;
pub use clock::{Clock, ManualClock, SystemClock};
pub use deadline::AtomicDeadline;
pub use error::{FaultKind, SubsystemFault};
pub use level::QualityLevel;
pub use sampler::UsageSampler;
pub use task::{DeferredTask, FnTask, TaskProgress};

const NANOS_PER_MS: f64 = 1_000_000.0;

/// Converts a [`std::time::Duration`] to fractional milliseconds.
#[inline]
pub fn duration_to_ms(duration: std::time::Duration) -> f64 {
    duration.as_nanos() as f64 / NANOS_PER_MS
}

/// Converts fractional milliseconds to a [`std::time::Duration`].
///
/// Negative and non-finite inputs map to [`std::time::Duration::ZERO`].
#[inline]
pub fn ms_to_duration(ms: f64) -> std::time::Duration {
    if ms.is_finite() && ms > 0.0 {
        std::time::Duration::from_nanos((ms * NANOS_PER_MS).round() as u64)
    } else {
        std::time::Duration::ZERO
    }
}
