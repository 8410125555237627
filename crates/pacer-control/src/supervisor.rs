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

//! Fail-isolation for the per-tick pipeline.
//!
//! Every step of the governor runs through [`Supervisor::supervise`]. An
//! error or panic becomes a [`SubsystemFault`] that is logged and recorded,
//! never propagated to the host loop. Depending on the step's
//! [`FailurePolicy`] it is either skipped for this tick or disabled for the
//! rest of the process.

use crate::handle::GovernorHandle;
use pacer_core::SubsystemFault;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Names of the built-in pipeline steps.
pub mod steps {
    /// Spike detection on each frame.
    pub const FRAME_PACING: &str = "frame_pacing";
    /// Stutter window, variance deferral and adaptive build budget.
    pub const FRAME_SHAPING: &str = "frame_shaping";
    /// Memory sampling and pressure detection.
    pub const MEMORY_SAMPLER: &str = "memory_sampler";
    /// Quality ladder.
    pub const LEVEL_GOVERNOR: &str = "level_governor";
    /// Rebuild limiter mode selection.
    pub const REBUILD_LIMITER: &str = "rebuild_limiter";
    /// HUD refresh gate.
    pub const HUD_GATE: &str = "hud_gate";
    /// Deferred task scheduler.
    pub const DEFERRED: &str = "deferred_scheduler";
    /// Periodic cache cleanup.
    pub const CACHE_CLEANUP: &str = "cache_cleanup";
}

/// What happens to a step after it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailurePolicy {
    /// Turn the step off for the rest of the process.
    Disable,
    /// Skip it this tick and try again next tick.
    SkipTick,
}

/// Everything a host-registered [`Subsystem`] sees during its tick.
pub struct TickContext<'a> {
    /// Governor time at the start of the tick.
    pub now: Duration,
    /// Tick counter, starting at 1.
    pub tick: u64,
    /// Read and permission access to the governor.
    pub governor: &'a GovernorHandle,
}

/// A host component ticked by the governor under fault isolation.
pub trait Subsystem: Send {
    /// Unique label.
    fn name(&self) -> &str;

    /// Policy applied when [`tick`](Subsystem::tick) fails.
    fn policy(&self) -> FailurePolicy {
        FailurePolicy::SkipTick
    }

    /// Runs once per governor tick.
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> anyhow::Result<()>;
}

/// Diagnostics for one supervised step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsystemStatus {
    /// Step name.
    pub name: String,
    /// Failure policy.
    pub policy: FailurePolicy,
    /// `false` once disabled.
    pub enabled: bool,
    /// Faults recorded so far.
    pub failures: u64,
    /// Message of the latest fault.
    pub last_error: Option<String>,
}

/// Result of one supervised call.
#[derive(Debug, PartialEq)]
pub enum StepOutcome<R> {
    /// The step ran and returned a value.
    Completed(R),
    /// The step errored or panicked.
    Faulted(SubsystemFault),
    /// The step is disabled and was not run.
    Disabled,
}

impl<R> StepOutcome<R> {
    /// The value of a completed step.
    pub fn ok(self) -> Option<R> {
        match self {
            StepOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

struct Registered {
    status_index: usize,
    subsystem: Box<dyn Subsystem>,
}

/// Runs steps under `catch_unwind` and tracks their health.
#[derive(Default)]
pub struct Supervisor {
    statuses: Vec<SubsystemStatus>,
    subsystems: Vec<Registered>,
}

impl Supervisor {
    /// Creates a supervisor with no history.
    pub fn new() -> Self {
        Self::default()
    }

    fn status_index(&mut self, name: &str, policy: FailurePolicy) -> usize {
        if let Some(index) = self.statuses.iter().position(|s| s.name == name) {
            return index;
        }
        self.statuses.push(SubsystemStatus {
            name: name.to_string(),
            policy,
            enabled: true,
            failures: 0,
            last_error: None,
        });
        self.statuses.len() - 1
    }

    fn record_fault(&mut self, index: usize, fault: &SubsystemFault) {
        let status = &mut self.statuses[index];
        status.failures += 1;
        status.last_error = Some(fault.message.clone());
        match status.policy {
            FailurePolicy::Disable => {
                status.enabled = false;
                log::warn!("Supervisor: {fault}; '{}' disabled", status.name);
            }
            FailurePolicy::SkipTick => {
                log::warn!("Supervisor: {fault}; skipping this tick");
            }
        }
    }

    /// Runs `step` unless `name` is disabled.
    ///
    /// The policy is fixed the first time a name is seen.
    pub fn supervise<R, F>(&mut self, name: &str, policy: FailurePolicy, step: F) -> StepOutcome<R>
    where
        F: FnOnce() -> anyhow::Result<R>,
    {
        let index = self.status_index(name, policy);
        if !self.statuses[index].enabled {
            return StepOutcome::Disabled;
        }

        let fault = match catch_unwind(AssertUnwindSafe(step)) {
            Ok(Ok(value)) => return StepOutcome::Completed(value),
            Ok(Err(e)) => SubsystemFault::from_error(name, &e),
            Err(payload) => SubsystemFault::from_panic(name, payload.as_ref()),
        };
        self.record_fault(index, &fault);
        StepOutcome::Faulted(fault)
    }

    /// Adds a host subsystem. It is ticked after the built-in steps.
    pub fn register(&mut self, subsystem: Box<dyn Subsystem>) {
        let name = subsystem.name().to_string();
        if self.statuses.iter().any(|s| s.name == name) {
            log::warn!("Supervisor: a step named '{name}' already exists; statuses will be shared");
        }
        let status_index = self.status_index(&name, subsystem.policy());
        log::info!("Supervisor: registered subsystem '{name}'");
        self.subsystems.push(Registered {
            status_index,
            subsystem,
        });
    }

    /// Ticks every registered subsystem in registration order.
    pub fn run_subsystems(&mut self, ctx: &mut TickContext<'_>) {
        for registered in &mut self.subsystems {
            let status = &mut self.statuses[registered.status_index];
            if !status.enabled {
                continue;
            }
            let subsystem = &mut registered.subsystem;
            let fault = match catch_unwind(AssertUnwindSafe(|| subsystem.tick(ctx))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => SubsystemFault::from_error(&status.name, &e),
                Err(payload) => SubsystemFault::from_panic(&status.name, payload.as_ref()),
            };
            status.failures += 1;
            status.last_error = Some(fault.message.clone());
            if status.policy == FailurePolicy::Disable {
                status.enabled = false;
                log::warn!("Supervisor: {fault}; '{}' disabled", status.name);
            } else {
                log::warn!("Supervisor: {fault}; skipping this tick");
            }
        }
    }

    /// Whether `name` may run. Unknown names are enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.statuses
            .iter()
            .find(|s| s.name == name)
            .map_or(true, |s| s.enabled)
    }

    /// Health of every step seen so far, in first-seen order.
    pub fn statuses(&self) -> &[SubsystemStatus] {
        &self.statuses
    }

    /// Number of host subsystems.
    pub fn subsystem_count(&self) -> usize {
        self.subsystems.len()
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("statuses", &self.statuses)
            .field("subsystems", &self.subsystems.len())
            .finish()
    }
}
