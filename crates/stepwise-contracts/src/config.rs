//! Per-run configuration.
//!
//! A `RunConfig` is resolved from a preset before launch and copied into the
//! `TaskState`. The engine never changes it mid-run, so a policy edit made
//! while a task is running (or paused) cannot affect that task.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Allow/deny list over capability names.
///
/// Patterns are exact names, `"*"` (anything), or a prefix ending in `*`
/// (e.g. `"fs.*"`). Deny wins over allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityFilter {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl Default for CapabilityFilter {
    fn default() -> Self {
        Self {
            allow: vec!["*".to_string()],
            deny: Vec::new(),
        }
    }
}

impl CapabilityFilter {
    /// Return true if `name` may be advertised and invoked under this filter.
    pub fn permits(&self, name: &str) -> bool {
        if self.deny.iter().any(|p| pattern_matches(p, name)) {
            return false;
        }
        self.allow.iter().any(|p| pattern_matches(p, name))
    }

    /// The first deny pattern that matches `name`, if any.
    pub fn denying_pattern(&self, name: &str) -> Option<&str> {
        self.deny
            .iter()
            .find(|p| pattern_matches(p, name))
            .map(String::as_str)
    }
}

/// Match a capability name against an allow/deny pattern.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

/// Immutable runtime configuration snapshot for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Upper bound on Plan→Execute cycles, remediation included.
    pub max_iterations: u32,
    /// Refuse `Unsafe` capabilities.
    pub safe_mode: bool,
    pub capabilities: CapabilityFilter,
    /// Capabilities that suspend the run for human input instead of running.
    pub interrupt_capabilities: Vec<String>,
    /// Ask the backend to judge each step. When false every step is an
    /// implicit success.
    pub verification: bool,
    /// Time limit for one reasoning backend call.
    pub planner_timeout_ms: u64,
    /// Optional hard cap on total run time. The engine also derives a budget
    /// from the iteration limit and timeouts and uses the smaller of the two.
    pub run_timeout_ms: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            safe_mode: true,
            capabilities: CapabilityFilter::default(),
            interrupt_capabilities: Vec::new(),
            verification: false,
            planner_timeout_ms: 30_000,
            run_timeout_ms: None,
        }
    }
}

impl RunConfig {
    pub fn planner_timeout(&self) -> Duration {
        Duration::from_millis(self.planner_timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    /// True if `name` is a human-in-the-loop gate for this run.
    pub fn is_interrupt(&self, name: &str) -> bool {
        self.interrupt_capabilities.iter().any(|c| c == name)
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    pub fn with_verification(mut self, verification: bool) -> Self {
        self.verification = verification;
        self
    }

    pub fn with_interrupt(mut self, capability: impl Into<String>) -> Self {
        self.interrupt_capabilities.push(capability.into());
        self
    }

    pub fn with_filter(mut self, filter: CapabilityFilter) -> Self {
        self.capabilities = filter;
        self
    }
}
