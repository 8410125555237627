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

//! # Pacer Control
//!
//! The decision layer of the governor. It turns the signals produced by
//! `pacer-telemetry` into permissions and levels that consumer subsystems
//! query through a [`GovernorHandle`].
//!
//! The [`GovernorService`] owns every detector and runs the pipeline once per
//! frame and once per tick:
//!
//! 1. **Frame path**: spike throttle, stutter window, variance deferral and
//!    the adaptive build budget.
//! 2. **Tick path**: events, budgets, memory pressure, quality ladder, rebuild
//!    limiter, HUD gate, deferred work, host subsystems and cache cleanup.
//!
//! Each step is isolated by the [`Supervisor`]: a failing step is skipped or
//! disabled without taking the host loop down.

#![warn(missing_docs)]

pub mod bucket;
pub mod budget;
pub mod cache;
pub mod config;
pub mod deferred;
pub mod event;
pub mod gate;
pub mod handle;
pub mod level;
pub mod profile;
pub mod service;
pub mod snapshot;
pub mod supervisor;

pub use bucket::TokenBucket;
pub use budget::{BudgetStatus, TickBudget, TickBudgetTable, BLOCK_ENTITY_UPDATES, CHUNK_BUILDS};
pub use cache::{CacheRegistry, CacheStatus, CleanupReport};
pub use config::{ConfigError, ConfigResult, GovernorConfig};
pub use deferred::{DeferredScheduler, SchedulerRun};
pub use event::GovernorEvent;
pub use gate::{AdaptiveBuildBudget, HudGate};
pub use handle::GovernorHandle;
pub use level::{LevelGovernor, LevelTransition};
pub use profile::OptimizationProfile;
pub use service::{GovernorService, TickReport};
pub use snapshot::GovernorSnapshot;
pub use supervisor::{
    FailurePolicy, StepOutcome, Subsystem, SubsystemStatus, Supervisor, TickContext,
};

pub use pacer_core::{
    CacheHandle, Clock, DeferredTask, FnTask, ManualClock, QualityLevel, SystemClock,
    TaskProgress, UsageSampler,
};
