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

//! The governor service driven by the host loop.
//!
//! The host owns one [`GovernorService`] and calls it from its primary
//! thread: once per rendered frame ([`GovernorService::on_frame`] or
//! [`GovernorService::record_frame_duration`]) and once per simulation tick
//! ([`GovernorService::tick`]). Consumer subsystems get a
//! [`GovernorHandle`] and never call back into the service.
//!
//! Per tick, in order:
//!
//! 1. Drain events sent from other threads.
//! 2. Refill the per-tick budgets.
//! 3. Sample memory and update the pressure window.
//! 4. Step the quality ladder.
//! 5. Select the rebuild limiter mode.
//! 6. Advance the HUD gate.
//! 7. Run deferred tasks within their budget.
//! 8. Tick host subsystems.
//! 9. Clean caches when the cleanup timer expires.
//!
//! Every step runs under the [`Supervisor`].

use crate::cache::CleanupReport;
use crate::config::GovernorConfig;
use crate::deferred::{DeferredScheduler, SchedulerRun};
use crate::event::GovernorEvent;
use crate::gate::{AdaptiveBuildBudget, HudGate};
use crate::handle::{GovernorHandle, SharedState};
use crate::level::{LevelGovernor, LevelTransition};
use crate::profile::OptimizationProfile;
use crate::snapshot::GovernorSnapshot;
use crate::supervisor::{
    steps, FailurePolicy, StepOutcome, Subsystem, SubsystemStatus, Supervisor, TickContext,
};
use crossbeam_channel::{Receiver, Sender};
use pacer_core::{
    duration_to_ms, CacheHandle, Clock, DeferredTask, QualityLevel, SystemClock, UsageSampler,
};
use pacer_telemetry::{
    MemoryPressureDetector, SpikeDetector, StutterWindow, TimingMonitor, VarianceMonitor,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Ticks between two debug summary lines (one minute at 20 ticks per second).
const SUMMARY_LOG_INTERVAL_TICKS: u64 = 1200;

/// What one [`GovernorService::tick`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Tick number, 0 when the governor is disabled.
    pub tick: u64,
    /// Quality ladder step taken this tick.
    pub level_transition: Option<LevelTransition>,
    /// Deferred scheduler activity.
    pub deferred: SchedulerRun,
    /// Cache cleanup, when the timer fired.
    pub cache_cleanup: Option<CleanupReport>,
}

/// The adaptive resource governor.
pub struct GovernorService {
    config: GovernorConfig,
    handle: GovernorHandle,
    events: Receiver<GovernorEvent>,
    timing: TimingMonitor,
    spike: SpikeDetector,
    stutter: StutterWindow,
    variance: VarianceMonitor,
    builds: AdaptiveBuildBudget,
    level: LevelGovernor,
    memory: MemoryPressureDetector,
    sampler: Option<Box<dyn UsageSampler>>,
    scheduler: DeferredScheduler,
    hud: HudGate,
    supervisor: Supervisor,
    pending_rates: Option<(f64, f64)>,
    last_cache_cleanup: Duration,
    tick_count: u64,
}

impl GovernorService {
    /// Creates a governor timed by the system clock.
    pub fn new(config: GovernorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Creates a governor timed by `clock`.
    ///
    /// The budget names in `config` are fixed for the life of the governor.
    pub fn with_clock(config: GovernorConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.sanitized();
        let (event_tx, event_rx) = crossbeam_channel::bounded(config.event_buffer_size);
        let now = clock.now();
        let shared = Arc::new(SharedState::new(&config, clock, event_tx));

        log::info!(
            "GovernorService: created (profile={}, {} tick budget(s), enabled={})",
            config.profile,
            shared.budgets.len(),
            config.enabled
        );

        Self {
            timing: TimingMonitor::new(config.frame_window, config.tick_window),
            spike: SpikeDetector::new(config.frame_pacing.spike_config()),
            stutter: StutterWindow::new(
                config.frame_pacing.spike_threshold_ms,
                Duration::from_millis(config.stutter.window_ms),
            ),
            variance: VarianceMonitor::new(
                config.variance.threshold_ms,
                config.variance.deferral_ticks,
            ),
            builds: AdaptiveBuildBudget::new(config.adaptive_builds.clone()),
            level: LevelGovernor::new(config.level.clone()),
            memory: MemoryPressureDetector::new(config.memory.pressure_config()),
            sampler: None,
            scheduler: DeferredScheduler::new(config.deferred.budget_ms),
            hud: HudGate::new(config.hud.interval_ticks),
            supervisor: Supervisor::new(),
            pending_rates: None,
            last_cache_cleanup: now,
            tick_count: 0,
            handle: GovernorHandle { shared },
            events: event_rx,
            config,
        }
    }

    fn shared(&self) -> &SharedState {
        &self.handle.shared
    }

    fn now(&self) -> Duration {
        self.shared().clock.now()
    }

    /// A handle for consumer subsystems.
    pub fn handle(&self) -> GovernorHandle {
        self.handle.clone()
    }

    /// Raw sender for [`GovernorEvent`]s.
    pub fn event_sender(&self) -> Sender<GovernorEvent> {
        self.shared().events.clone()
    }

    /// Installs the memory sampler polled once per tick.
    pub fn set_usage_sampler(&mut self, sampler: Box<dyn UsageSampler>) {
        log::info!("GovernorService: memory sampler '{}' installed", sampler.name());
        self.sampler = Some(sampler);
    }

    /// Registers a host subsystem ticked after the built-in steps.
    pub fn register_subsystem(&mut self, subsystem: Box<dyn Subsystem>) {
        self.supervisor.register(subsystem);
    }

    /// Health of every supervised step.
    pub fn subsystem_statuses(&self) -> &[SubsystemStatus] {
        self.supervisor.statuses()
    }

    // ── Frame path ──

    /// Marks a frame boundary using the governor clock.
    ///
    /// Returns the measured frame time; the first call only sets the baseline.
    pub fn on_frame(&mut self) -> Option<f64> {
        if !self.config.enabled {
            return None;
        }
        let now = self.now();
        let sample = self.timing.mark_frame(now)?;
        self.process_frame(sample, now);
        Some(sample)
    }

    /// Feeds a frame time measured by the host. Invalid samples are skipped.
    pub fn record_frame_duration(&mut self, frame_ms: f64) {
        if !self.config.enabled {
            return;
        }
        let now = self.now();
        if self.timing.record_frame(frame_ms) {
            self.process_frame(frame_ms, now);
        }
    }

    /// Feeds a tick processing time measured by the host. Invalid samples are skipped.
    ///
    /// Kept apart from the tick-to-tick interval that [`tick`](Self::tick)
    /// records on its own.
    pub fn record_tick_duration(&mut self, tick_ms: f64) {
        if self.config.enabled {
            self.timing.record_tick(tick_ms);
        }
    }

    fn process_frame(&mut self, frame_ms: f64, now: Duration) {
        let shared = &*self.handle.shared;
        let config = &self.config;

        if config.frame_pacing.enabled {
            let spike = &mut self.spike;
            self.supervisor.supervise(steps::FRAME_PACING, FailurePolicy::SkipTick, || {
                spike.on_sample(frame_ms, now);
                shared.throttle.store(spike.cooldown_end());
                Ok(())
            });
        }

        let stutter = &mut self.stutter;
        let variance = &mut self.variance;
        let builds = &mut self.builds;
        self.supervisor.supervise(steps::FRAME_SHAPING, FailurePolicy::SkipTick, || {
            if config.stutter.enabled {
                stutter.on_sample(frame_ms, now);
                shared.smoothing.store(stutter.window_end());
            }
            if config.variance.enabled {
                let deferring = variance.on_sample(frame_ms);
                shared.deferral.store(deferring, Ordering::Release);
            }
            shared.build_budget.store(builds.on_frame(frame_ms), Ordering::Release);
            Ok(())
        });

        self.refresh_rebuild_mode(now);
    }

    // ── Tick path ──

    /// Runs one governor tick. Call once per simulation tick.
    pub fn tick(&mut self) -> TickReport {
        self.drain_events();

        let mut report = TickReport::default();
        if !self.config.enabled {
            return report;
        }

        let now = self.now();
        self.tick_count += 1;
        report.tick = self.tick_count;

        // Refilled at tick start so consumers see full budgets all tick long
        self.shared().budgets.reset_all();
        self.timing.mark_tick(now);

        self.sample_memory(now);
        report.level_transition = self.step_level();
        self.refresh_rebuild_mode(now);
        self.step_hud();
        report.deferred = self.run_deferred();

        if self.supervisor.subsystem_count() > 0 {
            let handle = self.handle.clone();
            let mut ctx = TickContext {
                now,
                tick: self.tick_count,
                governor: &handle,
            };
            self.supervisor.run_subsystems(&mut ctx);
        }

        report.cache_cleanup = self.run_cache_timer(now);

        if self.tick_count % SUMMARY_LOG_INTERVAL_TICKS == 0
            && log::log_enabled!(log::Level::Debug)
        {
            log::debug!("GovernorService: {}", self.snapshot().summary_line());
        }
        report
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                GovernorEvent::UpdateConfig(config) => self.update_config(*config),
                GovernorEvent::ApplyProfile(profile) => self.apply_profile(profile),
                GovernorEvent::EnqueueDeferred(task) => {
                    let _ = self.shared().in_flight_tasks.fetch_update(
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        |n| Some(n.saturating_sub(1)),
                    );
                    self.scheduler.enqueue(task);
                }
                GovernorEvent::SetWorldReady(ready) => self.scheduler.set_world_ready(ready),
            }
        }
        self.publish_queue_length();
    }

    fn sample_memory(&mut self, now: Duration) {
        if !self.config.memory.enabled || !self.memory.is_enabled() {
            return;
        }
        let Some(sampler) = self.sampler.as_mut() else {
            return;
        };

        let memory = &mut self.memory;
        let outcome = self
            .supervisor
            .supervise(steps::MEMORY_SAMPLER, FailurePolicy::Disable, || {
                match sampler.sample_bytes()? {
                    Some(bytes) => {
                        memory.on_sample(bytes, now);
                    }
                    None => log::trace!("GovernorService: no memory reading this tick"),
                }
                Ok(())
            });

        if let StepOutcome::Faulted(fault) = outcome {
            self.memory.disable(fault.to_string());
            self.sampler = None;
        }
        self.shared().pressure.store(self.memory.cooldown_end());
    }

    fn step_level(&mut self) -> Option<LevelTransition> {
        if !self.config.level.enabled {
            return None;
        }
        let frame_ms = self.timing.frames().latest().filter(|ms| *ms > 0.0)?;
        let rate = 1000.0 / frame_ms;

        let level = &mut self.level;
        let transition = self
            .supervisor
            .supervise(steps::LEVEL_GOVERNOR, FailurePolicy::SkipTick, || {
                Ok(level.update(rate))
            })
            .ok()
            .flatten()?;

        self.shared().level.store(transition.to.as_u8(), Ordering::Release);
        log::info!(
            "GovernorService: quality {} -> {} (smoothed {:.1} fps)",
            transition.from,
            transition.to,
            transition.signal
        );
        Some(transition)
    }

    fn refresh_rebuild_mode(&mut self, now: Duration) {
        let shared = &*self.handle.shared;
        let throttled = shared.rebuild_throttled(now);
        let pending_rates = self.pending_rates;

        let applied = self
            .supervisor
            .supervise(steps::REBUILD_LIMITER, FailurePolicy::SkipTick, || {
                Ok(shared
                    .with_bucket(|bucket| {
                        if let Some((normal, slow)) = pending_rates {
                            bucket.update_rates(normal, slow, now);
                        }
                        bucket.set_throttled(throttled);
                    })
                    .is_some())
            })
            .ok()
            .unwrap_or(false);

        // A busy bucket keeps the new rates pending until the next frame or tick
        if applied {
            self.pending_rates = None;
        }
    }

    fn step_hud(&mut self) {
        let shared = &*self.handle.shared;
        let gate_enabled = self.config.hud.enabled;
        let hud = &mut self.hud;
        self.supervisor.supervise(steps::HUD_GATE, FailurePolicy::SkipTick, || {
            let refresh = !gate_enabled || hud.on_tick();
            shared.hud_refresh.store(refresh, Ordering::Release);
            Ok(())
        });
    }

    fn run_deferred(&mut self) -> SchedulerRun {
        if !self.config.deferred.enabled {
            return SchedulerRun::default();
        }
        let clock = &*self.handle.shared.clock;
        let scheduler = &mut self.scheduler;
        let run = self
            .supervisor
            .supervise(steps::DEFERRED, FailurePolicy::SkipTick, || {
                Ok(scheduler.run(clock))
            })
            .ok()
            .unwrap_or_default();
        self.publish_queue_length();
        run
    }

    fn run_cache_timer(&mut self, now: Duration) -> Option<CleanupReport> {
        if !self.config.caches.enabled
            || now.saturating_sub(self.last_cache_cleanup) < self.config.cache_cleanup_interval()
        {
            return None;
        }
        self.last_cache_cleanup = now;
        log::trace!("GovernorService: cache cleanup timer fired");

        let caches = &self.handle.shared.caches;
        self.supervisor
            .supervise(steps::CACHE_CLEANUP, FailurePolicy::SkipTick, || {
                Ok(caches.cleanup_all())
            })
            .ok()
    }

    fn publish_queue_length(&self) {
        self.shared().queue_len.store(self.scheduler.queue_length(), Ordering::Release);
    }

    // ── Memory ──

    /// Feeds a memory reading taken by the host at `timestamp` (governor clock).
    pub fn record_memory_usage(&mut self, usage_bytes: u64, timestamp: Duration) {
        if !self.config.enabled || !self.config.memory.enabled {
            return;
        }
        self.memory.on_sample(usage_bytes, timestamp);
        self.shared().pressure.store(self.memory.cooldown_end());
        self.refresh_rebuild_mode(self.now());
    }

    // ── Queries and permissions ──

    /// `true` while the frame-pacing throttle window is open.
    pub fn is_throttling_active(&self) -> bool {
        self.handle.is_throttling_active()
    }

    /// Current quality level.
    pub fn current_level(&self) -> QualityLevel {
        self.handle.current_level()
    }

    /// `true` while the memory pressure window is open.
    pub fn is_under_memory_pressure(&self) -> bool {
        self.handle.is_under_memory_pressure()
    }

    /// Whether the HUD may refresh on the current tick.
    pub fn should_refresh_hud(&self) -> bool {
        self.handle.should_refresh_hud()
    }

    /// `true` while frame times are too unstable for heavy work.
    pub fn is_deferral_active(&self) -> bool {
        self.handle.is_deferral_active()
    }

    /// `true` while the stutter smoothing window is open.
    pub fn is_smoothing(&self) -> bool {
        self.handle.is_smoothing()
    }

    /// Geometry builds allowed per tick.
    pub fn adaptive_build_budget(&self) -> u32 {
        self.handle.adaptive_build_budget()
    }

    /// Takes one rebuild token.
    pub fn try_acquire_rebuild_token(&self) -> bool {
        self.handle.try_acquire_rebuild_token()
    }

    /// Consumes one unit of a per-tick budget.
    pub fn try_consume_tick_budget(&self, name: &str) -> bool {
        self.handle.try_consume_tick_budget(name)
    }

    /// Zeroes the spike counter.
    pub fn reset_spike_counter(&mut self) {
        self.spike.reset_spike_counter();
    }

    // ── Deferred work ──

    /// Appends a task to the deferred queue.
    pub fn enqueue_deferred(&mut self, task: Box<dyn DeferredTask>) {
        self.scheduler.enqueue(task);
        self.publish_queue_length();
    }

    /// Queued tasks, including ones submitted through handles but not yet drained.
    pub fn queue_length(&self) -> usize {
        self.scheduler.queue_length() + self.shared().in_flight_tasks.load(Ordering::Acquire)
    }

    /// Opens or closes the deferred scheduler gate.
    pub fn set_world_ready(&mut self, ready: bool) {
        self.scheduler.set_world_ready(ready);
    }

    // ── Caches ──

    /// Registers a cache, replacing any cache with the same name.
    pub fn register_cache(&self, cache: Arc<dyn CacheHandle>) {
        self.handle.register_cache(cache);
    }

    /// Removes a cache. Returns `true` if it was registered.
    pub fn unregister_cache(&self, name: &str) -> bool {
        self.handle.unregister_cache(name)
    }

    /// Runs every cache cleanup now.
    pub fn cleanup_all_caches(&self) -> CleanupReport {
        self.handle.cleanup_all_caches()
    }

    // ── Configuration ──

    /// Current configuration.
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Applies a new configuration.
    ///
    /// Budget names are fixed at construction: limits of known budgets change,
    /// new names are ignored. The event channel keeps its original capacity.
    pub fn update_config(&mut self, config: GovernorConfig) {
        let config = config.sanitized();
        let shared = &*self.handle.shared;

        self.timing.resize(config.frame_window, config.tick_window);

        self.spike.set_config(config.frame_pacing.spike_config());
        if !config.frame_pacing.enabled {
            shared.throttle.clear();
        }

        self.stutter.configure(
            config.frame_pacing.spike_threshold_ms,
            Duration::from_millis(config.stutter.window_ms),
        );
        if !config.stutter.enabled {
            self.stutter.reset();
            shared.smoothing.clear();
        }

        self.variance.configure(config.variance.threshold_ms, config.variance.deferral_ticks);
        if !config.variance.enabled {
            shared.deferral.store(false, Ordering::Release);
        }

        self.builds.configure(config.adaptive_builds.clone());
        shared.build_budget.store(self.builds.budget(), Ordering::Release);

        self.level.set_config(config.level.clone());
        if !config.level.enabled {
            self.level.reset();
            shared
                .level
                .store(QualityLevel::Full.as_u8(), Ordering::Release);
        }

        self.memory.set_config(config.memory.pressure_config());
        if config.memory.enabled {
            shared.pressure.store(self.memory.cooldown_end());
        } else {
            shared.pressure.clear();
        }

        shared.rebuild_limited.store(config.rebuild.enabled, Ordering::Release);
        self.pending_rates = Some((config.rebuild.normal_rate, config.rebuild.throttled_rate));

        shared.budgets.apply(&config.budgets);
        self.scheduler.set_tick_budget_ms(config.deferred.budget_ms);

        self.hud.set_interval(config.hud.interval_ticks);
        if !config.hud.enabled {
            shared.hud_refresh.store(true, Ordering::Release);
        }

        if config.enabled != self.config.enabled {
            log::info!("GovernorService: enabled={}", config.enabled);
        }
        shared.enabled.store(config.enabled, Ordering::Release);

        log::info!("GovernorService: configuration updated (profile={})", config.profile);
        self.config = config;
        self.refresh_rebuild_mode(self.now());
    }

    /// Applies a preset on top of the current configuration.
    pub fn apply_profile(&mut self, profile: OptimizationProfile) {
        let mut config = self.config.clone();
        config.apply_profile(profile);
        self.update_config(config);
    }

    // ── Diagnostics ──

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Frame and tick timing windows.
    pub fn timing(&self) -> &TimingMonitor {
        &self.timing
    }

    /// Point-in-time view of the whole governor.
    pub fn snapshot(&self) -> GovernorSnapshot {
        let now = self.now();
        let handle = &self.handle;
        let shared = self.shared();

        GovernorSnapshot {
            tick: self.tick_count,
            enabled: self.config.enabled,
            profile: self.config.profile,
            timing: self.timing.summary(),
            frame_ema_ms: self.spike.ema(),
            spike_count: self.spike.spike_count(),
            throttling: handle.is_throttling_active(),
            throttle_remaining_ms: duration_to_ms(handle.throttle_remaining()),
            level: handle.current_level(),
            level_signal: self.level.signal(),
            rebuild_tokens: handle.rebuild_tokens(),
            queue_length: self.queue_length(),
            world_ready: self.scheduler.is_world_ready(),
            memory_pressure: handle.is_under_memory_pressure(),
            memory_pressure_remaining_ms: duration_to_ms(self.memory.cooldown_remaining(now)),
            memory_detection_enabled: self.memory.is_enabled(),
            hud_refresh: handle.should_refresh_hud(),
            deferral_active: handle.is_deferral_active(),
            smoothing: handle.is_smoothing(),
            adaptive_build_budget: handle.adaptive_build_budget(),
            budgets: shared.budgets.statuses(),
            caches: shared.caches.snapshot(),
            subsystems: self.supervisor.statuses().to_vec(),
        }
    }
}

impl Default for GovernorService {
    fn default() -> Self {
        Self::new(GovernorConfig::default())
    }
}

impl std::fmt::Debug for GovernorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorService")
            .field("tick_count", &self.tick_count)
            .field("handle", &self.handle)
            .field("scheduler", &self.scheduler)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}
