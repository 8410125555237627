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

//! Contract for resumable background work.

/// Outcome of one [`DeferredTask::resume`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskProgress {
    /// The task has finished and can be dropped.
    Complete,
    /// The task yielded and wants to be resumed on a later tick.
    Pending,
}

/// A unit of background work that runs in small steps.
///
/// The task carries its own progress between calls. Each call to
/// [`resume`](DeferredTask::resume) should do a bounded slice of work and
/// return; the scheduler never interrupts a step in the middle.
pub trait DeferredTask: Send {
    /// A short label used in logs.
    fn name(&self) -> &str {
        "deferred-task"
    }

    /// Advances the task by one step.
    ///
    /// Returning `Err` (or panicking) discards the task.
    fn resume(&mut self) -> anyhow::Result<TaskProgress>;
}

/// Adapts a closure into a [`DeferredTask`].
pub struct FnTask<F> {
    name: String,
    step: F,
}

impl<F> FnTask<F>
where
    F: FnMut() -> anyhow::Result<TaskProgress> + Send,
{
    /// Wraps `step` under the given log label.
    pub fn new(name: impl Into<String>, step: F) -> Self {
        Self {
            name: name.into(),
            step,
        }
    }
}

impl<F> DeferredTask for FnTask<F>
where
    F: FnMut() -> anyhow::Result<TaskProgress> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self) -> anyhow::Result<TaskProgress> {
        (self.step)()
    }
}
