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

// Pacer Sandbox
// Simulated host loop driving the governor with a scripted frame-time trace

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use pacer_control::{
    CacheHandle, FnTask, GovernorConfig, GovernorService, ManualClock, OptimizationProfile,
    Subsystem, TaskProgress, TickContext, UsageSampler, CHUNK_BUILDS,
};
use sysinfo::{Pid, ProcessesToUpdate, System};

const TICK_MS: f64 = 50.0;
const FRAMES: u64 = 1200;

/// Resident memory of this process, read through `sysinfo`.
struct ProcessMemorySampler {
    system: System,
    pid: Pid,
}

impl ProcessMemorySampler {
    fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(anyhow::Error::msg)?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl UsageSampler for ProcessMemorySampler {
    fn name(&self) -> &str {
        "process-memory"
    }

    fn sample_bytes(&mut self) -> Result<Option<u64>> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        Ok(self.system.process(self.pid).map(|process| process.memory()))
    }
}

struct MeshCache {
    bytes: AtomicU64,
}

impl CacheHandle for MeshCache {
    fn name(&self) -> &str {
        "chunk_meshes"
    }

    fn approximate_size(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn cleanup(&self) -> Result<()> {
        let before = self.bytes.fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| Some(b / 2));
        log::debug!("MeshCache: trimmed from {:?} bytes", before.ok());
        Ok(())
    }
}

/// Builds dirty chunks within the governor's per-tick allowances.
struct ChunkStreamer {
    dirty: u64,
    built: u64,
    cache: Arc<MeshCache>,
}

impl Subsystem for ChunkStreamer {
    fn name(&self) -> &str {
        "chunk_streamer"
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<()> {
        self.dirty += 3;
        let allowance = ctx.governor.adaptive_build_budget();
        let mut built_this_tick = 0;
        while self.dirty > 0
            && built_this_tick < allowance
            && ctx.governor.try_consume_tick_budget(CHUNK_BUILDS)
            && ctx.governor.try_acquire_rebuild_token()
        {
            self.dirty -= 1;
            self.built += 1;
            built_this_tick += 1;
            self.cache.bytes.fetch_add(64 * 1024, Ordering::Relaxed);
        }
        if ctx.tick % 100 == 0 {
            log::info!(
                "ChunkStreamer: {} built, {} dirty, level {}",
                self.built,
                self.dirty,
                ctx.governor.current_level()
            );
        }
        Ok(())
    }
}

/// Scripted frame times: a steady baseline, a slow stretch, and periodic hitches.
fn frame_time_ms(frame: u64) -> f64 {
    let wobble = (frame as f64 * 0.37).sin() * 1.5;
    let base = if (400..700).contains(&frame) { 24.0 } else { 15.0 };
    if frame % 150 == 149 {
        45.0
    } else {
        base + wobble
    }
}

fn load_config() -> Result<GovernorConfig> {
    let Some(arg) = std::env::args().nth(1) else {
        return Ok(GovernorConfig::default());
    };
    if arg.ends_with(".json") {
        return Ok(GovernorConfig::from_file(&arg)?);
    }
    let mut config = GovernorConfig::default();
    config.apply_profile(OptimizationProfile::from_name(&arg));
    Ok(config)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let clock = Arc::new(ManualClock::new());
    let mut governor = GovernorService::with_clock(config, clock.clone());

    match ProcessMemorySampler::new() {
        Ok(sampler) => governor.set_usage_sampler(Box::new(sampler)),
        Err(e) => log::warn!("Sandbox: memory sampling unavailable: {e}"),
    }

    let cache = Arc::new(MeshCache {
        bytes: AtomicU64::new(0),
    });
    governor.register_cache(cache.clone());
    governor.register_subsystem(Box::new(ChunkStreamer {
        dirty: 0,
        built: 0,
        cache,
    }));

    // World generation submits lighting work from its own thread.
    let handle = governor.handle();
    let worldgen = thread::spawn(move || {
        for region in 0..24 {
            let mut passes_left = 3;
            let task = FnTask::new(format!("light_region_{region}"), move || {
                passes_left -= 1;
                Ok(if passes_left == 0 {
                    TaskProgress::Complete
                } else {
                    TaskProgress::Pending
                })
            });
            if !handle.enqueue_deferred(Box::new(task)) {
                log::warn!("Sandbox: lighting for region {region} was dropped");
            }
        }
    });
    worldgen
        .join()
        .map_err(|_| anyhow::anyhow!("world generation thread panicked"))?;

    let mut since_tick = 0.0;
    for frame in 0..FRAMES {
        let frame_ms = frame_time_ms(frame);
        clock.advance_ms(frame_ms);
        governor.record_frame_duration(frame_ms);

        since_tick += frame_ms;
        while since_tick >= TICK_MS {
            since_tick -= TICK_MS;
            let report = governor.tick();
            if report.tick == 5 {
                governor.set_world_ready(true);
            }
            if report.deferred.completed > 0 {
                log::debug!("Sandbox: {} lighting task(s) finished", report.deferred.completed);
            }
            if report.tick % 100 == 0 {
                log::info!("Sandbox: {}", governor.snapshot().summary_line());
            }
        }
    }

    println!("{}", governor.snapshot().to_json()?);
    Ok(())
}
