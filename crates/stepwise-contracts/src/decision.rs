//! Structured decisions returned by the planner and remediator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A concrete capability call chosen by the reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub reasoning: String,
    pub capability_name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// What to do next: act through a capability, or stop because the goal is
/// satisfied.
///
/// Wire form is internally tagged:
///
/// ```json
/// { "type": "act", "reasoning": "...", "capability_name": "write_file", "arguments": {} }
/// { "type": "finish", "reasoning": "...", "answer": "done" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    Act(ActionCall),
    Finish {
        reasoning: String,
        #[serde(default)]
        answer: Option<String>,
    },
}

impl Decision {
    pub fn reasoning(&self) -> &str {
        match self {
            Decision::Act(call) => &call.reasoning,
            Decision::Finish { reasoning, .. } => reasoning,
        }
    }

    /// The capability this decision would invoke, if any.
    pub fn capability_name(&self) -> Option<&str> {
        match self {
            Decision::Act(call) => Some(&call.capability_name),
            Decision::Finish { .. } => None,
        }
    }
}
