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

//! Fault type reported when a supervised step fails.

use std::any::Any;

/// How a supervised step failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The step returned an error.
    Error,
    /// The step panicked.
    Panic,
}

/// A failure captured while running one step of the governor pipeline.
///
/// Faults never reach the host loop; they are logged and recorded so the
/// failing step can be skipped or disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemFault {
    /// Name of the failing step.
    pub subsystem: String,
    /// Whether it errored or panicked.
    pub kind: FaultKind,
    /// Human-readable cause.
    pub message: String,
}

impl SubsystemFault {
    /// Builds a fault from a returned error, keeping the full cause chain.
    pub fn from_error(subsystem: &str, error: &anyhow::Error) -> Self {
        Self {
            subsystem: subsystem.to_string(),
            kind: FaultKind::Error,
            message: format!("{error:#}"),
        }
    }

    /// Builds a fault from a panic payload captured by `catch_unwind`.
    pub fn from_panic(subsystem: &str, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            subsystem: subsystem.to_string(),
            kind: FaultKind::Panic,
            message,
        }
    }
}

impl std::fmt::Display for SubsystemFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FaultKind::Error => write!(f, "{} failed: {}", self.subsystem, self.message),
            FaultKind::Panic => write!(f, "{} panicked: {}", self.subsystem, self.message),
        }
    }
}

impl std::error::Error for SubsystemFault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_from_error_keeps_context() {
        let err = anyhow::anyhow!("disk gone").context("reading stats");
        let fault = SubsystemFault::from_error("memory", &err);
        assert_eq!(fault.kind, FaultKind::Error);
        assert_eq!(fault.to_string(), "memory failed: reading stats: disk gone");
    }

    #[test]
    fn test_fault_from_panic_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        let fault = SubsystemFault::from_panic("caches", boxed.as_ref());
        assert_eq!(fault.message, "boom");
        assert_eq!(fault.kind, FaultKind::Panic);

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(
            SubsystemFault::from_panic("caches", boxed.as_ref()).message,
            "owned boom"
        );

        let boxed: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(
            SubsystemFault::from_panic("caches", boxed.as_ref()).message,
            "non-string panic payload"
        );
    }
}
