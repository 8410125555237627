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

//! Boundary trait for host-provided memory telemetry.

/// Reads the current memory usage of the host process.
///
/// Implementations live outside the governor (OS queries, allocator stats).
pub trait UsageSampler: Send {
    /// A short label used in logs and diagnostics.
    fn name(&self) -> &str {
        "usage-sampler"
    }

    /// Samples the used memory in bytes.
    ///
    /// - `Ok(Some(bytes))`: a valid reading.
    /// - `Ok(None)`: no reading this time; the sample is skipped.
    /// - `Err(_)`: the sampler is broken; memory-pressure detection is
    ///   disabled for the rest of the process.
    fn sample_bytes(&mut self) -> anyhow::Result<Option<u64>>;
}

impl<F> UsageSampler for F
where
    F: FnMut() -> anyhow::Result<Option<u64>> + Send,
{
    fn sample_bytes(&mut self) -> anyhow::Result<Option<u64>> {
        self()
    }
}
