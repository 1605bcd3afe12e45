//! The capability policy gate.
//!
//! `CapabilityPolicy` implements the `PolicyEngine` trait from stepwise-core.
//!
//! Evaluation order, first match wins:
//!
//! 1. A process-wide deny pattern matches the capability → `Deny`.
//! 2. The run is in safe mode and the capability is `Unsafe` → `Deny`.
//! 3. A deny pattern of the run's filter matches → `Deny`.
//! 4. No allow pattern of the run's filter matches → `Deny`.
//! 5. Otherwise → `Allow`.

use tracing::{debug, warn};

use stepwise_contracts::{
    capability::SafetyClass,
    config::pattern_matches,
    policy::{PolicyContext, PolicyVerdict},
};
use stepwise_core::traits::PolicyEngine;

/// Safe-mode and allow/deny gate for capability calls.
///
/// Stateless apart from the process-wide deny list, which is fixed at
/// construction. Per-run rules arrive in the `PolicyContext`.
#[derive(Debug, Clone, Default)]
pub struct CapabilityPolicy {
    global_deny: Vec<String>,
}

impl CapabilityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse capabilities matching any of `patterns` in every run,
    /// regardless of the run's own filter.
    pub fn with_global_deny<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_deny.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn global_deny(&self) -> &[String] {
        &self.global_deny
    }
}

impl PolicyEngine for CapabilityPolicy {
    fn evaluate(&self, ctx: &PolicyContext) -> PolicyVerdict {
        debug!(
            task_id = %ctx.task_id,
            capability = %ctx.capability,
            safety_class = %ctx.safety_class,
            safe_mode = ctx.safe_mode,
            "evaluating policy"
        );

        let verdict = if let Some(pattern) =
            self.global_deny.iter().find(|p| pattern_matches(p, &ctx.capability))
        {
            PolicyVerdict::Deny {
                reason: format!("capability is blocked for all runs by pattern '{pattern}'"),
            }
        } else if ctx.safe_mode && ctx.safety_class == SafetyClass::Unsafe {
            PolicyVerdict::Deny {
                reason: "unsafe capability refused in safe mode".to_string(),
            }
        } else if let Some(pattern) = ctx.filter.denying_pattern(&ctx.capability) {
            PolicyVerdict::Deny {
                reason: format!("capability is denied by pattern '{pattern}'"),
            }
        } else if !ctx.filter.permits(&ctx.capability) {
            PolicyVerdict::Deny {
                reason: "capability is not in the run's allow list".to_string(),
            }
        } else {
            PolicyVerdict::Allow
        };

        if let PolicyVerdict::Deny { reason } = &verdict {
            warn!(
                task_id = %ctx.task_id,
                capability = %ctx.capability,
                reason = %reason,
                "policy denied capability"
            );
        }
        verdict
    }
}
