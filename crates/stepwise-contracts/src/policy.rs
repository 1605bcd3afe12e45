//! Policy verdict and evaluation context types.
//!
//! The dispatcher consumes a `PolicyContext` and obtains a `PolicyVerdict`
//! before any capability handler runs. Anything other than `Allow` means the
//! handler is never invoked.

use serde::{Deserialize, Serialize};

use crate::{capability::SafetyClass, config::CapabilityFilter};

/// The decision emitted by the policy engine for a single capability call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyVerdict {
    /// The call may proceed to argument validation.
    Allow,

    /// The call is refused.
    Deny {
        /// Human-readable explanation, recorded in the failed step.
        reason: String,
    },
}

/// Everything the policy engine needs to make a decision.
///
/// Built by the dispatcher from the resolved descriptor and the run's
/// configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyContext {
    /// String form of the task's `TaskId`.
    pub task_id: String,
    /// The capability the planner asked for.
    pub capability: String,
    /// The resolved descriptor's safety classification.
    pub safety_class: SafetyClass,
    /// Whether the run refuses unsafe capabilities.
    pub safe_mode: bool,
    /// The run's allow/deny list.
    pub filter: CapabilityFilter,
}
