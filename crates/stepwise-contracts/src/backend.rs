//! Requests sent to the reasoning backend.
//!
//! The core never formats prompts. It hands the backend a typed request that
//! says what is being asked (`purpose`), everything known about the task, and
//! the JSON Schema the answer must satisfy. How that becomes a prompt is the
//! backend's business.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{capability::CapabilityDescriptor, step::StepRecord};

/// Which engine step issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPurpose {
    Plan,
    Verify,
    Remediate,
}

impl fmt::Display for BackendPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendPurpose::Plan => f.write_str("plan"),
            BackendPurpose::Verify => f.write_str("verify"),
            BackendPurpose::Remediate => f.write_str("remediate"),
        }
    }
}

/// Context for the single repair attempt after a malformed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairContext {
    /// The answer that failed validation, verbatim.
    pub malformed_output: Value,
    /// Why it failed.
    pub error: String,
}

/// One call to the reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub purpose: BackendPurpose,
    pub task_id: String,
    pub goal: String,
    pub history: Vec<StepRecord>,
    /// Capabilities the run may use, after allow/deny filtering.
    pub capabilities: Vec<CapabilityDescriptor>,
    /// The step being judged (verify) or repaired (remediate).
    pub subject: Option<StepRecord>,
    /// JSON Schema the answer must satisfy.
    pub expected_shape: Value,
    /// Present only on the repair attempt.
    pub repair: Option<RepairContext>,
}

impl BackendRequest {
    pub fn is_repair(&self) -> bool {
        self.repair.is_some()
    }
}
