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

//! Messages sent to the governor from other threads.

use crate::config::GovernorConfig;
use crate::profile::OptimizationProfile;
use pacer_core::DeferredTask;

/// A request drained by the governor at the start of its next tick.
pub enum GovernorEvent {
    /// Replace the configuration.
    UpdateConfig(Box<GovernorConfig>),
    /// Apply a preset on top of the current configuration.
    ApplyProfile(OptimizationProfile),
    /// Append a task to the deferred queue.
    EnqueueDeferred(Box<dyn DeferredTask>),
    /// Open or close the deferred scheduler gate.
    SetWorldReady(bool),
}

impl std::fmt::Debug for GovernorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GovernorEvent::UpdateConfig(_) => f.write_str("UpdateConfig(..)"),
            GovernorEvent::ApplyProfile(p) => write!(f, "ApplyProfile({p})"),
            GovernorEvent::EnqueueDeferred(task) => write!(f, "EnqueueDeferred({})", task.name()),
            GovernorEvent::SetWorldReady(ready) => write!(f, "SetWorldReady({ready})"),
        }
    }
}
