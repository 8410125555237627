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

//! Cooperative deferred-task scheduler.
//!
//! Background work is queued as [`DeferredTask`]s and advanced a step at a
//! time on the primary thread, under a hard wall-clock budget per tick:
//!
//! 1. Nothing runs until the world is marked ready.
//! 2. Tasks run strictly in FIFO order.
//! 3. A task that yields (`Pending`) keeps its place at the head and ends the
//!    tick, so a later task never overtakes it.
//! 4. A failing or panicking task is dropped; the others keep running.

use pacer_core::{Clock, DeferredTask, SubsystemFault, TaskProgress};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Smallest per-tick budget, in milliseconds.
pub const MIN_TICK_BUDGET_MS: u64 = 1;
/// Largest per-tick budget, in milliseconds.
pub const MAX_TICK_BUDGET_MS: u64 = 20;
/// Budget used when none is configured.
pub const DEFAULT_TICK_BUDGET_MS: u64 = 5;

/// What one [`DeferredScheduler::run`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerRun {
    /// `resume` calls made.
    pub steps: u32,
    /// Tasks that finished.
    pub completed: u32,
    /// Tasks dropped after an error or panic.
    pub failed: u32,
    /// A task yielded and is waiting at the head.
    pub pending: bool,
    /// The run stopped because the budget was spent.
    pub budget_exhausted: bool,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}

/// FIFO queue of resumable tasks with a per-tick time budget.
pub struct DeferredScheduler {
    queue: VecDeque<Box<dyn DeferredTask>>,
    tick_budget: Duration,
    world_ready: bool,
}

impl DeferredScheduler {
    /// Creates an empty scheduler with the gate closed.
    pub fn new(tick_budget_ms: u64) -> Self {
        Self {
            queue: VecDeque::new(),
            tick_budget: Duration::from_millis(clamp_budget(tick_budget_ms)),
            world_ready: false,
        }
    }

    /// Appends a task. The queue is unbounded; watch [`queue_length`](Self::queue_length).
    pub fn enqueue(&mut self, task: Box<dyn DeferredTask>) {
        log::trace!("DeferredScheduler: queued '{}'", task.name());
        self.queue.push_back(task);
    }

    /// Tasks waiting, including a partially run head.
    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    /// Opens or closes the gate.
    pub fn set_world_ready(&mut self, ready: bool) {
        if self.world_ready != ready {
            log::debug!("DeferredScheduler: world_ready={ready}");
        }
        self.world_ready = ready;
    }

    /// Whether tasks may run.
    pub fn is_world_ready(&self) -> bool {
        self.world_ready
    }

    /// Sets the per-tick budget, clamped to `1..=20` ms.
    pub fn set_tick_budget_ms(&mut self, ms: u64) {
        self.tick_budget = Duration::from_millis(clamp_budget(ms));
    }

    /// The per-tick budget.
    pub fn tick_budget(&self) -> Duration {
        self.tick_budget
    }

    /// Drops every queued task and returns how many there were.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Advances queued tasks until the queue empties, a task yields, or the
    /// budget is spent.
    ///
    /// The budget is checked before each step; a step that starts inside the
    /// budget always runs to its end.
    pub fn run(&mut self, clock: &dyn Clock) -> SchedulerRun {
        let mut run = SchedulerRun::default();
        if !self.world_ready || self.queue.is_empty() {
            return run;
        }

        let start = clock.now();
        loop {
            if clock.now().saturating_sub(start) > self.tick_budget {
                run.budget_exhausted = true;
                break;
            }
            let Some(task) = self.queue.front_mut() else {
                break;
            };

            run.steps += 1;
            match catch_unwind(AssertUnwindSafe(|| task.resume())) {
                Ok(Ok(TaskProgress::Complete)) => {
                    if let Some(task) = self.queue.pop_front() {
                        log::debug!("DeferredScheduler: '{}' complete", task.name());
                    }
                    run.completed += 1;
                }
                Ok(Ok(TaskProgress::Pending)) => {
                    run.pending = true;
                    break;
                }
                Ok(Err(e)) => {
                    if let Some(task) = self.queue.pop_front() {
                        let fault = SubsystemFault::from_error(task.name(), &e);
                        log::warn!("DeferredScheduler: dropped task: {fault}");
                    }
                    run.failed += 1;
                }
                Err(payload) => {
                    if let Some(task) = self.queue.pop_front() {
                        let fault = SubsystemFault::from_panic(task.name(), payload.as_ref());
                        log::warn!("DeferredScheduler: dropped task: {fault}");
                    }
                    run.failed += 1;
                }
            }
        }

        run.elapsed = clock.now().saturating_sub(start);
        run
    }
}

impl Default for DeferredScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_BUDGET_MS)
    }
}

impl std::fmt::Debug for DeferredScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredScheduler")
            .field("queue_length", &self.queue.len())
            .field("tick_budget", &self.tick_budget)
            .field("world_ready", &self.world_ready)
            .finish()
    }
}

fn clamp_budget(ms: u64) -> u64 {
    ms.clamp(MIN_TICK_BUDGET_MS, MAX_TICK_BUDGET_MS)
}
