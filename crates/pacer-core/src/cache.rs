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

//! Contract for caches that can be told to shed memory.

/// A cache owned by some subsystem and registered with the governor.
///
/// The governor never inspects cache contents. It only asks for a size
/// estimate and, periodically, tells the cache to clean up.
pub trait CacheHandle: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    /// Best-effort size estimate in bytes.
    fn approximate_size(&self) -> u64;

    /// Drops whatever the cache considers stale.
    fn cleanup(&self) -> anyhow::Result<()>;
}
