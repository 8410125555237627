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
    FnTask, GovernorConfig, GovernorService, ManualClock, TaskProgress, BLOCK_ENTITY_UPDATES,
    CHUNK_BUILDS,
};
use std::sync::Arc;
use std::thread;

fn governor() -> GovernorService {
    let _ = env_logger::builder().is_test(true).try_init();
    GovernorService::with_clock(GovernorConfig::default(), Arc::new(ManualClock::new()))
}

#[test]
fn test_tick_budget_grants_exactly_max_across_threads() {
    // --- 1. ARRANGE ---
    let mut governor = governor();
    governor.tick();

    // --- 2. ACT ---
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let handle = governor.handle();
            thread::spawn(move || {
                (0..40)
                    .filter(|_| handle.try_consume_tick_budget(BLOCK_ENTITY_UPDATES))
                    .count()
            })
        })
        .collect();
    let granted: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

    // --- 3. ASSERT ---
    assert_eq!(granted, 50, "8 x 40 attempts must yield exactly the budget");
    // Other budgets are independent.
    assert_eq!(governor.handle().tick_budget_remaining(CHUNK_BUILDS), Some(4));
}

#[test]
fn test_tasks_submitted_from_threads_join_the_queue_next_tick() {
    // --- 1. ARRANGE ---
    let mut governor = governor();
    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let handle = governor.handle();
            thread::spawn(move || {
                (0..10)
                    .filter(|i| {
                        let task = FnTask::new(format!("task_{t}_{i}"), || {
                            Ok(TaskProgress::Complete)
                        });
                        handle.enqueue_deferred(Box::new(task))
                    })
                    .count()
            })
        })
        .collect();
    let sent: usize = submitters.into_iter().map(|s| s.join().unwrap()).sum();

    // --- 2. ACT ---
    let before = governor.handle().queue_length();
    governor.tick();
    let queued = governor.queue_length();

    // --- 3. ASSERT ---
    assert_eq!(sent, 40);
    assert_eq!(before, 40, "In-flight submissions count toward the queue");
    assert_eq!(queued, 40, "Gate is closed, nothing may run yet");
    assert_eq!(governor.handle().queue_length(), 40);
}

#[test]
fn test_full_event_channel_rejects_without_blocking() {
    // --- 1. ARRANGE ---
    let config = GovernorConfig {
        event_buffer_size: 2,
        ..GovernorConfig::default()
    };
    let mut governor =
        GovernorService::with_clock(config, Arc::new(ManualClock::new()));
    let handle = governor.handle();

    // --- 2. ACT ---
    let results: Vec<bool> = (0..3).map(|_| handle.set_world_ready(true)).collect();

    // --- 3. ASSERT ---
    assert_eq!(results, vec![true, true, false]);
    governor.tick();
    assert!(handle.set_world_ready(false), "Draining frees the channel");
}
