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

//! # Pacer Telemetry
//!
//! Signal collection for the governor. Everything in this crate turns raw
//! timestamps and memory readings into boolean or numeric signals:
//!
//! 1. [`metrics`]: rolling sample storage with mean and percentile queries.
//! 2. [`delta`] and [`timing`]: frame and tick durations from timestamps.
//! 3. [`spike`]: EMA-smoothed spike detection with a throttle cooldown.
//! 4. [`memory`]: memory growth bursts with a pressure cooldown.
//! 5. [`stutter`] and [`variance`]: smoothing and deferral windows.
//!
//! None of these types are shared across threads. The control layer owns them
//! and publishes their results.

#![warn(missing_docs)]

pub mod delta;
pub mod memory;
pub mod metrics;
pub mod spike;
pub mod stutter;
pub mod timing;
pub mod variance;

pub use delta::DeltaClock;
pub use memory::{MemoryPressureConfig, MemoryPressureDetector};
pub use metrics::{RingBuffer, TimingTracker};
pub use spike::{SpikeConfig, SpikeDetector};
pub use stutter::StutterWindow;
pub use timing::{TimingMonitor, TimingSummary};
pub use variance::VarianceMonitor;
