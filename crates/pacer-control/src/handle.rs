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

//! Thread-safe view of the governor for consumer subsystems.

use crate::bucket::TokenBucket;
use crate::budget::TickBudgetTable;
use crate::cache::{CacheRegistry, CleanupReport};
use crate::config::GovernorConfig;
use crate::event::GovernorEvent;
use crate::profile::OptimizationProfile;
use crossbeam_channel::{Sender, TrySendError};
use pacer_core::{AtomicDeadline, CacheHandle, Clock, DeferredTask, QualityLevel};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

/// State published by the primary thread and read everywhere else.
///
/// Everything here is atomic except the rebuild bucket, which is only ever
/// touched with `try_lock`.
pub(crate) struct SharedState {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) enabled: AtomicBool,
    pub(crate) throttle: AtomicDeadline,
    pub(crate) pressure: AtomicDeadline,
    pub(crate) smoothing: AtomicDeadline,
    pub(crate) level: AtomicU8,
    pub(crate) hud_refresh: AtomicBool,
    pub(crate) deferral: AtomicBool,
    pub(crate) build_budget: AtomicU32,
    pub(crate) queue_len: AtomicUsize,
    pub(crate) in_flight_tasks: AtomicUsize,
    pub(crate) rebuild_limited: AtomicBool,
    pub(crate) rebuild: Mutex<TokenBucket>,
    pub(crate) budgets: TickBudgetTable,
    pub(crate) caches: CacheRegistry,
    pub(crate) events: Sender<GovernorEvent>,
}

impl SharedState {
    pub(crate) fn new(
        config: &GovernorConfig,
        clock: Arc<dyn Clock>,
        events: Sender<GovernorEvent>,
    ) -> Self {
        let now = clock.now();
        Self {
            enabled: AtomicBool::new(config.enabled),
            throttle: AtomicDeadline::new(),
            pressure: AtomicDeadline::new(),
            smoothing: AtomicDeadline::new(),
            level: AtomicU8::new(QualityLevel::Full.as_u8()),
            hud_refresh: AtomicBool::new(true),
            deferral: AtomicBool::new(false),
            build_budget: AtomicU32::new(config.adaptive_builds.max_per_tick.max(1)),
            queue_len: AtomicUsize::new(0),
            in_flight_tasks: AtomicUsize::new(0),
            rebuild_limited: AtomicBool::new(config.rebuild.enabled),
            rebuild: Mutex::new(TokenBucket::new(
                config.rebuild.normal_rate,
                config.rebuild.throttled_rate,
                now,
            )),
            budgets: TickBudgetTable::from_config(&config.budgets),
            caches: CacheRegistry::new(),
            events,
            clock,
        }
    }

    /// Runs `f` on the bucket unless another thread holds it.
    pub(crate) fn with_bucket<R>(&self, f: impl FnOnce(&mut TokenBucket) -> R) -> Option<R> {
        match self.rebuild.try_lock() {
            Ok(mut bucket) => Some(f(&mut bucket)),
            // Plain numeric state, still consistent after a poisoning panic
            Err(TryLockError::Poisoned(poisoned)) => Some(f(&mut poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Whether the rebuild limiter should run at its throttled rate at `now`.
    pub(crate) fn rebuild_throttled(&self, now: Duration) -> bool {
        self.throttle.is_pending(now) || self.pressure.is_pending(now)
    }

    pub(crate) fn send(&self, event: GovernorEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::warn!("GovernorHandle: event channel full, dropped {event:?}");
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                log::debug!("GovernorHandle: governor gone, dropped {event:?}");
                false
            }
        }
    }
}

/// Cheap, clonable handle used by consumer subsystems on any thread.
///
/// Queries read published state; permissions consume tokens or budget units.
/// Nothing here blocks. When the governor's master switch is off, every
/// permission is granted and every query reports an idle governor.
#[derive(Clone)]
pub struct GovernorHandle {
    pub(crate) shared: Arc<SharedState>,
}

impl GovernorHandle {
    fn enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Governor time.
    pub fn now(&self) -> Duration {
        self.shared.clock.now()
    }

    /// `true` while the frame-pacing throttle window is open.
    pub fn is_throttling_active(&self) -> bool {
        self.enabled() && self.shared.throttle.is_pending(self.now())
    }

    /// Time left in the throttle window.
    pub fn throttle_remaining(&self) -> Duration {
        if !self.enabled() {
            return Duration::ZERO;
        }
        self.shared.throttle.remaining(self.now())
    }

    /// Current quality level.
    pub fn current_level(&self) -> QualityLevel {
        if !self.enabled() {
            return QualityLevel::Full;
        }
        QualityLevel::from_u8(self.shared.level.load(Ordering::Acquire))
    }

    /// `true` while the memory pressure window is open.
    pub fn is_under_memory_pressure(&self) -> bool {
        self.enabled() && self.shared.pressure.is_pending(self.now())
    }

    /// Whether the HUD may refresh on the current tick.
    pub fn should_refresh_hud(&self) -> bool {
        !self.enabled() || self.shared.hud_refresh.load(Ordering::Acquire)
    }

    /// `true` while frame times are too unstable for heavy work.
    pub fn is_deferral_active(&self) -> bool {
        self.enabled() && self.shared.deferral.load(Ordering::Acquire)
    }

    /// `true` while the stutter smoothing window is open.
    pub fn is_smoothing(&self) -> bool {
        self.enabled() && self.shared.smoothing.is_pending(self.now())
    }

    /// Geometry builds allowed per tick by the adaptive budget.
    pub fn adaptive_build_budget(&self) -> u32 {
        self.shared.build_budget.load(Ordering::Acquire)
    }

    /// Takes one rebuild token.
    ///
    /// The bucket mode follows the throttle and pressure windows at the time
    /// of the call. Denied when the bucket is empty or another thread is using it.
    pub fn try_acquire_rebuild_token(&self) -> bool {
        if !self.enabled() || !self.shared.rebuild_limited.load(Ordering::Acquire) {
            return true;
        }
        let now = self.now();
        let throttled = self.shared.rebuild_throttled(now);
        self.shared
            .with_bucket(|bucket| {
                bucket.set_throttled(throttled);
                bucket.try_acquire(now)
            })
            .unwrap_or(false)
    }

    /// Tokens currently in the rebuild bucket, `None` if it is busy.
    pub fn rebuild_tokens(&self) -> Option<f64> {
        let now = self.now();
        let throttled = self.shared.rebuild_throttled(now);
        self.shared.with_bucket(|bucket| {
            bucket.set_throttled(throttled);
            bucket.tokens(now)
        })
    }

    /// Consumes one unit of the named per-tick budget. Unknown names are granted.
    pub fn try_consume_tick_budget(&self, name: &str) -> bool {
        !self.enabled() || self.shared.budgets.try_consume(name)
    }

    /// Units left in the named budget this tick.
    pub fn tick_budget_remaining(&self, name: &str) -> Option<u32> {
        self.shared.budgets.get(name).map(|b| b.remaining())
    }

    /// Submits a task; it joins the queue at the start of the next tick.
    ///
    /// Returns `false` if the event channel is full.
    pub fn enqueue_deferred(&self, task: Box<dyn DeferredTask>) -> bool {
        self.shared.in_flight_tasks.fetch_add(1, Ordering::AcqRel);
        let sent = self.shared.send(GovernorEvent::EnqueueDeferred(task));
        if !sent {
            self.shared.in_flight_tasks.fetch_sub(1, Ordering::AcqRel);
        }
        sent
    }

    /// Queued tasks plus tasks submitted but not yet drained.
    pub fn queue_length(&self) -> usize {
        self.shared.queue_len.load(Ordering::Acquire)
            + self.shared.in_flight_tasks.load(Ordering::Acquire)
    }

    /// Opens or closes the deferred scheduler gate at the next tick.
    pub fn set_world_ready(&self, ready: bool) -> bool {
        self.shared.send(GovernorEvent::SetWorldReady(ready))
    }

    /// Replaces the configuration at the next tick.
    pub fn update_config(&self, config: GovernorConfig) -> bool {
        self.shared.send(GovernorEvent::UpdateConfig(Box::new(config)))
    }

    /// Applies a preset at the next tick.
    pub fn apply_profile(&self, profile: OptimizationProfile) -> bool {
        self.shared.send(GovernorEvent::ApplyProfile(profile))
    }

    /// Registers a cache, replacing any cache with the same name.
    pub fn register_cache(&self, cache: Arc<dyn CacheHandle>) {
        self.shared.caches.register(cache);
    }

    /// Removes a cache. Returns `true` if it was registered.
    pub fn unregister_cache(&self, name: &str) -> bool {
        self.shared.caches.unregister(name).is_some()
    }

    /// Runs every cache cleanup now, on the calling thread.
    pub fn cleanup_all_caches(&self) -> CleanupReport {
        self.shared.caches.cleanup_all()
    }

    /// Number of registered caches.
    pub fn cache_count(&self) -> usize {
        self.shared.caches.len()
    }
}

impl std::fmt::Debug for GovernorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorHandle")
            .field("level", &self.current_level())
            .field("throttling", &self.is_throttling_active())
            .field("memory_pressure", &self.is_under_memory_pressure())
            .field("queue_length", &self.queue_length())
            .finish()
    }
}
