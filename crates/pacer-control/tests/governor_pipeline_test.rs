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

use pacer_control::{
    CacheHandle, FailurePolicy, GovernorConfig, GovernorService, ManualClock, QualityLevel,
    Subsystem, TickContext, BLOCK_ENTITY_UPDATES,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn governor_with(config: GovernorConfig) -> (GovernorService, Arc<ManualClock>) {
    init_logger();
    let clock = Arc::new(ManualClock::starting_at(Duration::from_secs(1)));
    let service = GovernorService::with_clock(config, clock.clone());
    (service, clock)
}

// --- DUMMY HOST PIECES FOR THESE TESTS ---
struct CountingCache {
    cleanups: AtomicUsize,
}

impl CacheHandle for CountingCache {
    fn name(&self) -> &str {
        "chunk_meshes"
    }

    fn approximate_size(&self) -> u64 {
        4 * MIB
    }

    fn cleanup(&self) -> anyhow::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FlakySubsystem {
    policy: FailurePolicy,
    ticks: Arc<AtomicUsize>,
}

impl Subsystem for FlakySubsystem {
    fn name(&self) -> &str {
        match self.policy {
            FailurePolicy::Disable => "flaky_disable",
            FailurePolicy::SkipTick => "flaky_skip",
        }
    }

    fn policy(&self) -> FailurePolicy {
        self.policy
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> anyhow::Result<()> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if ctx.tick % 2 == 1 {
            panic!("odd tick {}", ctx.tick);
        }
        Ok(())
    }
}

#[test]
fn test_frame_spike_throttles_rebuild_limiter() {
    // --- 1. ARRANGE ---
    let (mut governor, clock) = governor_with(GovernorConfig::default());
    let handle = governor.handle();

    // --- 2. ACT ---
    // A single 40ms frame is above the 28ms threshold even though the EMA is not.
    governor.record_frame_duration(40.0);
    let granted = (0..100)
        .filter(|_| handle.try_acquire_rebuild_token())
        .count();

    // --- 3. ASSERT ---
    assert!(handle.is_throttling_active());
    assert_eq!(granted, 15, "Throttled bucket should cap at the throttled rate");

    clock.advance(Duration::from_millis(749));
    assert!(handle.is_throttling_active());
    clock.advance(Duration::from_millis(1));
    assert!(!handle.is_throttling_active(), "Cooldown end is exclusive");
}

#[test]
fn test_quality_ladder_steps_down_with_cooldown() {
    // --- 1. ARRANGE ---
    let (mut governor, _clock) = governor_with(GovernorConfig::default());
    // 25ms frames are 40 fps against a 60 fps target.
    governor.record_frame_duration(25.0);

    // --- 2. ACT ---
    let mut transitions = Vec::new();
    for _ in 0..60 {
        let report = governor.tick();
        if let Some(transition) = report.level_transition {
            transitions.push((report.tick, transition.from, transition.to));
        }
    }

    // --- 3. ASSERT ---
    // The smoothed signal first drops below 51 fps on tick 8, then the
    // 40-tick cooldown holds the ladder until tick 48.
    assert_eq!(
        transitions,
        vec![
            (8, QualityLevel::Full, QualityLevel::Reduced),
            (48, QualityLevel::Reduced, QualityLevel::Minimal),
        ]
    );
    assert_eq!(governor.current_level(), QualityLevel::Minimal);
    assert_eq!(governor.handle().current_level(), QualityLevel::Minimal);
}

#[test]
fn test_memory_growth_above_threshold_raises_pressure() {
    // --- 1. ARRANGE ---
    let (mut governor, clock) = governor_with(GovernorConfig::default());
    let t0 = Duration::from_secs(1);
    let t1 = Duration::from_secs(2);

    // --- 2. ACT ---
    governor.record_memory_usage(512 * MIB, t0);
    clock.set(t1);
    governor.record_memory_usage(512 * MIB + 128 * MIB, t1);

    // --- 3. ASSERT ---
    assert!(
        !governor.is_under_memory_pressure(),
        "Growth equal to the threshold is not pressure"
    );

    governor.record_memory_usage(512 * MIB + 256 * MIB + 1, t1 + Duration::from_millis(100));
    assert!(governor.is_under_memory_pressure());
    // Pressure throttles the rebuild limiter as well.
    let granted = (0..100)
        .filter(|_| governor.try_acquire_rebuild_token())
        .count();
    assert_eq!(granted, 15);

    clock.set(t1 + Duration::from_millis(2100));
    assert!(!governor.is_under_memory_pressure());
}

#[test]
fn test_panicking_sampler_disables_memory_detection_only() {
    // --- 1. ARRANGE ---
    let (mut governor, clock) = governor_with(GovernorConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let sampler_calls = calls.clone();
    governor.set_usage_sampler(Box::new(move || -> anyhow::Result<Option<u64>> {
        sampler_calls.fetch_add(1, Ordering::SeqCst);
        panic!("allocator statistics unavailable");
    }));

    let completed = Arc::new(AtomicUsize::new(0));
    let task_completed = completed.clone();
    governor.set_world_ready(true);
    governor.enqueue_deferred(Box::new(pacer_control::FnTask::new("light_update", move || {
        task_completed.fetch_add(1, Ordering::SeqCst);
        Ok(pacer_control::TaskProgress::Complete)
    })));

    // --- 2. ACT ---
    governor.tick();
    clock.advance(Duration::from_millis(50));
    governor.tick();
    governor.record_frame_duration(45.0);

    // --- 3. ASSERT ---
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Sampler must not be polled again");
    let snapshot = governor.snapshot();
    assert!(!snapshot.memory_detection_enabled);
    let status = snapshot
        .subsystems
        .iter()
        .find(|s| s.name == "memory_sampler")
        .expect("memory sampler status");
    assert!(!status.enabled);
    assert_eq!(status.failures, 1);

    // Everything else keeps working.
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert!(governor.is_throttling_active());
}

#[test]
fn test_budgets_refill_every_tick() {
    // --- 1. ARRANGE ---
    let (mut governor, _clock) = governor_with(GovernorConfig::default());
    let handle = governor.handle();

    for _tick in 0..3 {
        // --- 2. ACT ---
        governor.tick();
        let granted = (0..80)
            .filter(|_| handle.try_consume_tick_budget(BLOCK_ENTITY_UPDATES))
            .count();

        // --- 3. ASSERT ---
        assert_eq!(granted, 50);
        assert_eq!(handle.tick_budget_remaining(BLOCK_ENTITY_UPDATES), Some(0));
    }
    assert!(handle.try_consume_tick_budget("not_configured"));
}

#[test]
fn test_master_switch_off_grants_everything() {
    // --- 1. ARRANGE ---
    let config = GovernorConfig {
        enabled: false,
        ..GovernorConfig::default()
    };
    let (mut governor, _clock) = governor_with(config);
    let handle = governor.handle();

    // --- 2. ACT ---
    for _ in 0..10 {
        governor.record_frame_duration(100.0);
        governor.tick();
    }

    // --- 3. ASSERT ---
    assert!(!handle.is_throttling_active());
    assert_eq!(handle.current_level(), QualityLevel::Full);
    assert!(handle.should_refresh_hud());
    assert!((0..500).all(|_| handle.try_acquire_rebuild_token()));
    assert!((0..500).all(|_| handle.try_consume_tick_budget(BLOCK_ENTITY_UPDATES)));
    assert_eq!(governor.tick_count(), 0);
}

#[test]
fn test_config_update_through_handle_applies_next_tick() {
    // --- 1. ARRANGE ---
    let (mut governor, _clock) = governor_with(GovernorConfig::default());
    let handle = governor.handle();
    let mut config = governor.config().clone();
    config.enabled = false;

    // --- 2. ACT ---
    assert!(handle.update_config(config));
    assert!(governor.config().enabled, "Nothing changes before the tick");
    governor.tick();

    // --- 3. ASSERT ---
    assert!(!governor.config().enabled);
    assert!((0..200).all(|_| handle.try_acquire_rebuild_token()));

    // Re-enabling is also drained while disabled.
    let mut config = governor.config().clone();
    config.enabled = true;
    handle.update_config(config);
    governor.tick();
    assert!(governor.config().enabled);
    assert_eq!(governor.tick_count(), 1);
}

#[test]
fn test_cache_cleanup_timer_and_supervised_subsystems() {
    // --- 1. ARRANGE ---
    let mut config = GovernorConfig::default();
    config.caches.cleanup_interval_secs = 1;
    let (mut governor, clock) = governor_with(config);

    let cache = Arc::new(CountingCache {
        cleanups: AtomicUsize::new(0),
    });
    governor.register_cache(cache.clone());

    let skip_ticks = Arc::new(AtomicUsize::new(0));
    let disable_ticks = Arc::new(AtomicUsize::new(0));
    governor.register_subsystem(Box::new(FlakySubsystem {
        policy: FailurePolicy::SkipTick,
        ticks: skip_ticks.clone(),
    }));
    governor.register_subsystem(Box::new(FlakySubsystem {
        policy: FailurePolicy::Disable,
        ticks: disable_ticks.clone(),
    }));

    // --- 2. ACT ---
    let mut cleanups = Vec::new();
    for _ in 0..4 {
        clock.advance(Duration::from_millis(500));
        let report = governor.tick();
        cleanups.push(report.cache_cleanup.map(|r| r.cleaned));
    }

    // --- 3. ASSERT ---
    assert_eq!(cleanups, vec![None, Some(1), None, Some(1)]);
    assert_eq!(cache.cleanups.load(Ordering::SeqCst), 2);

    // SkipTick keeps running after a panic, Disable stops at the first one.
    assert_eq!(skip_ticks.load(Ordering::SeqCst), 4);
    assert_eq!(disable_ticks.load(Ordering::SeqCst), 1);
    let statuses = governor.subsystem_statuses();
    let skip = statuses.iter().find(|s| s.name == "flaky_skip").unwrap();
    assert!(skip.enabled);
    assert_eq!(skip.failures, 2);
    let disabled = statuses.iter().find(|s| s.name == "flaky_disable").unwrap();
    assert!(!disabled.enabled);
}

#[test]
fn test_reported_tick_durations_and_tick_intervals_stay_apart() {
    // --- 1. ARRANGE ---
    let (mut governor, clock) = governor_with(GovernorConfig::default());

    // --- 2. ACT ---
    // The host reports 5ms of processing while ticks run every 50ms.
    for _ in 0..10 {
        clock.advance(Duration::from_millis(50));
        governor.record_tick_duration(5.0);
        governor.tick();
    }

    // --- 3. ASSERT ---
    let timing = governor.snapshot().timing;
    assert_eq!(timing.tick_samples, 10);
    assert_eq!(timing.tick_avg_ms, 5.0);
    // The first tick only sets the interval baseline.
    assert_eq!(timing.tick_interval_samples, 9);
    assert_eq!(timing.tick_interval_avg_ms, 50.0);
}

#[test]
fn test_rebuild_limiter_recovers_when_throttle_expires_between_ticks() {
    // --- 1. ARRANGE ---
    let (mut governor, clock) = governor_with(GovernorConfig::default());
    let handle = governor.handle();
    governor.record_frame_duration(40.0);
    assert!(handle.is_throttling_active());

    // --- 2. ACT ---
    // No frame or tick runs while the cooldown expires and the bucket refills.
    clock.advance(Duration::from_secs(2));
    let granted = (0..100)
        .filter(|_| handle.try_acquire_rebuild_token())
        .count();

    // --- 3. ASSERT ---
    assert!(!handle.is_throttling_active());
    assert_eq!(granted, 60, "Normal rate applies as soon as the window closes");
}
