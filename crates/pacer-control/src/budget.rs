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

//! Per-tick allowances shared with worker threads.

use crate::config::BudgetConfig;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Block-entity updates allowed per tick.
pub const BLOCK_ENTITY_UPDATES: &str = "block_entity_updates";
/// Geometry chunk builds allowed per tick.
pub const CHUNK_BUILDS: &str = "chunk_builds";

/// A decrement-to-zero counter refilled once per tick.
///
/// Safe to consume from any number of threads; a grant is a successful
/// compare-and-swap, so no more than `max` grants happen between two resets.
#[derive(Debug)]
pub struct TickBudget {
    remaining: AtomicU32,
    max: AtomicU32,
    enabled: AtomicBool,
}

impl TickBudget {
    /// Creates a full budget.
    pub fn new(max: u32, enabled: bool) -> Self {
        Self {
            remaining: AtomicU32::new(max),
            max: AtomicU32::new(max),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Refills to `max`.
    pub fn reset(&self) {
        self.remaining
            .store(self.max.load(Ordering::Acquire), Ordering::Release);
    }

    /// Takes one unit. A disabled budget always grants.
    pub fn try_consume(&self) -> bool {
        if !self.enabled.load(Ordering::Acquire) {
            return true;
        }
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
            .is_ok()
    }

    /// Units left this tick.
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Units per tick.
    pub fn max(&self) -> u32 {
        self.max.load(Ordering::Acquire)
    }

    /// Returns `false` when the budget grants unconditionally.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Changes `max` and `enabled`. The remaining count is capped at the new max.
    pub fn configure(&self, max: u32, enabled: bool) {
        self.max.store(max, Ordering::Release);
        self.enabled.store(enabled, Ordering::Release);
        let _ = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| Some(r.min(max)));
    }
}

/// Point-in-time view of one budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    /// Budget name.
    pub name: String,
    /// Units left this tick.
    pub remaining: u32,
    /// Units per tick.
    pub max: u32,
    /// Whether the budget is enforced.
    pub enabled: bool,
}

/// Named budgets, fixed when the governor is built.
///
/// The key set never changes afterwards, so lookups need no lock.
#[derive(Debug, Default)]
pub struct TickBudgetTable {
    budgets: HashMap<String, TickBudget>,
}

impl TickBudgetTable {
    /// Builds the table from the configured budgets.
    pub fn from_config(config: &BTreeMap<String, BudgetConfig>) -> Self {
        let budgets = config
            .iter()
            .map(|(name, cfg)| (name.clone(), TickBudget::new(cfg.max, cfg.enabled)))
            .collect();
        Self { budgets }
    }

    /// Consumes one unit of `name`. Unknown names are granted.
    pub fn try_consume(&self, name: &str) -> bool {
        match self.budgets.get(name) {
            Some(budget) => budget.try_consume(),
            None => {
                log::debug!("TickBudgetTable: unknown budget '{name}', granting");
                true
            }
        }
    }

    /// Refills every budget.
    pub fn reset_all(&self) {
        for budget in self.budgets.values() {
            budget.reset();
        }
    }

    /// Applies new limits to known budgets. New names are ignored with a warning.
    pub fn apply(&self, config: &BTreeMap<String, BudgetConfig>) {
        for (name, cfg) in config {
            match self.budgets.get(name) {
                Some(budget) => budget.configure(cfg.max, cfg.enabled),
                None => log::warn!(
                    "TickBudgetTable: budget '{name}' was not declared at startup, ignoring"
                ),
            }
        }
    }

    /// Looks up a budget.
    pub fn get(&self, name: &str) -> Option<&TickBudget> {
        self.budgets.get(name)
    }

    /// Number of budgets.
    pub fn len(&self) -> usize {
        self.budgets.len()
    }

    /// Returns `true` if no budget is declared.
    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty()
    }

    /// Status of every budget, sorted by name.
    pub fn statuses(&self) -> Vec<BudgetStatus> {
        let mut statuses: Vec<_> = self
            .budgets
            .iter()
            .map(|(name, b)| BudgetStatus {
                name: name.clone(),
                remaining: b.remaining(),
                max: b.max(),
                enabled: b.is_enabled(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}
