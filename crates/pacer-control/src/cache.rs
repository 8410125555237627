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

//! Registry of caches that can shed memory.

use dashmap::DashMap;
use pacer_core::{CacheHandle, SubsystemFault};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Size estimate of one registered cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Registry key.
    pub name: String,
    /// Reported size in bytes.
    pub approximate_size: u64,
}

/// Outcome of [`CacheRegistry::cleanup_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    /// Caches whose cleanup succeeded.
    pub cleaned: usize,
    /// Caches whose cleanup errored or panicked.
    pub failed: Vec<SubsystemFault>,
}

/// Concurrent name-keyed directory of caches.
///
/// Registration and removal work from any thread. Cleanup calls happen
/// outside the map's locks, so a cache may unregister itself from its own
/// `cleanup`.
#[derive(Default)]
pub struct CacheRegistry {
    caches: DashMap<String, Arc<dyn CacheHandle>>,
}

impl CacheRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cache under its name, returning the cache it replaced.
    pub fn register(&self, cache: Arc<dyn CacheHandle>) -> Option<Arc<dyn CacheHandle>> {
        let name = cache.name().to_string();
        let previous = self.caches.insert(name.clone(), cache);
        if previous.is_some() {
            log::debug!("CacheRegistry: replaced '{name}'");
        } else {
            log::info!("CacheRegistry: registered '{name}'");
        }
        previous
    }

    /// Removes a cache.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn CacheHandle>> {
        let removed = self.caches.remove(name).map(|(_, cache)| cache);
        if removed.is_some() {
            log::info!("CacheRegistry: unregistered '{name}'");
        }
        removed
    }

    /// Returns `true` if a cache is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Number of registered caches.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Returns `true` if no cache is registered.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    fn handles(&self) -> Vec<Arc<dyn CacheHandle>> {
        self.caches.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Size of every cache, sorted by name.
    pub fn snapshot(&self) -> Vec<CacheStatus> {
        let mut statuses: Vec<_> = self
            .handles()
            .iter()
            .map(|cache| CacheStatus {
                name: cache.name().to_string(),
                approximate_size: cache.approximate_size(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Sum of every cache's size estimate.
    pub fn total_approximate_size(&self) -> u64 {
        self.handles()
            .iter()
            .map(|c| c.approximate_size())
            .fold(0, u64::saturating_add)
    }

    /// Tells every cache to clean up. One failure never stops the others.
    pub fn cleanup_all(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for cache in self.handles() {
            let name = cache.name().to_string();
            match catch_unwind(AssertUnwindSafe(|| cache.cleanup())) {
                Ok(Ok(())) => report.cleaned += 1,
                Ok(Err(e)) => {
                    let fault = SubsystemFault::from_error(&name, &e);
                    log::warn!("CacheRegistry: cleanup failed: {fault}");
                    report.failed.push(fault);
                }
                Err(payload) => {
                    let fault = SubsystemFault::from_panic(&name, payload.as_ref());
                    log::warn!("CacheRegistry: cleanup failed: {fault}");
                    report.failed.push(fault);
                }
            }
        }
        if report.cleaned + report.failed.len() > 0 {
            log::debug!(
                "CacheRegistry: cleaned {} cache(s), {} failed",
                report.cleaned,
                report.failed.len()
            );
        }
        report
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("CacheRegistry").field("caches", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingCache {
        name: String,
        size: u64,
        cleanups: AtomicU32,
        fail: bool,
    }

    impl CountingCache {
        fn new(name: &str, size: u64, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                size,
                cleanups: AtomicU32::new(0),
                fail,
            })
        }
    }

    impl CacheHandle for CountingCache {
        fn name(&self) -> &str {
            &self.name
        }

        fn approximate_size(&self) -> u64 {
            self.size
        }

        fn cleanup(&self) -> anyhow::Result<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("evict failed");
            }
            Ok(())
        }
    }

    #[test]
    fn test_empty_cleanup_is_noop() {
        let registry = CacheRegistry::new();
        let report = registry.cleanup_all();
        assert_eq!(report, CleanupReport::default());
        assert_eq!(registry.total_approximate_size(), 0);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = CacheRegistry::new();
        assert!(registry.register(CountingCache::new("textures", 10, false)).is_none());
        assert!(registry.register(CountingCache::new("textures", 20, false)).is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.total_approximate_size(), 20);
    }

    #[test]
    fn test_failure_does_not_stop_other_cleanups() {
        let registry = CacheRegistry::new();
        let a = CountingCache::new("a", 1, false);
        let b = CountingCache::new("b", 2, true);
        let c = CountingCache::new("c", 3, false);
        registry.register(a.clone());
        registry.register(b.clone());
        registry.register(c.clone());

        let report = registry.cleanup_all();
        assert_eq!(report.cleaned, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].subsystem, "b");
        for cache in [&a, &b, &c] {
            assert_eq!(cache.cleanups.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_unregister_and_snapshot() {
        let registry = CacheRegistry::new();
        registry.register(CountingCache::new("z", 5, false));
        registry.register(CountingCache::new("m", 7, false));
        assert!(registry.unregister("z").is_some());
        assert!(registry.unregister("z").is_none());

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot,
            vec![CacheStatus {
                name: "m".to_string(),
                approximate_size: 7
            }]
        );
    }
}
