//! Step records: the audit log entries of a run.
//!
//! Every Plan→Execute cycle produces exactly one `StepRecord`. Once the engine
//! appends a record to `TaskState::history` it is never modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who chose the action recorded in a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOrigin {
    Planner,
    Remediator,
    /// A synthetic step carrying human feedback injected on resume.
    Human,
}

/// Classification of a failed capability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CapabilityNotFound,
    PolicyDenied,
    ArgumentValidation,
    Timeout,
    Handler,
}

/// A normalized capability failure, fed back to the planner as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Whether repeating the same call could plausibly succeed.
    pub retriable: bool,
}

/// The result half of a step: capability output or a structured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Success { output: Value },
    Failure(CapabilityFailure),
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            StepResult::Success { output } => Some(output),
            StepResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&CapabilityFailure> {
        match self {
            StepResult::Failure(f) => Some(f),
            StepResult::Success { .. } => None,
        }
    }
}

/// The verifier's verdict on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgementVerdict {
    Success,
    Failure,
}

/// A verdict plus the short rationale the verifier gave for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub verdict: JudgementVerdict,
    pub rationale: String,
}

impl Judgement {
    pub fn passed(&self) -> bool {
        self.verdict == JudgementVerdict::Success
    }
}

/// An immutable record of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the history. Assigned by `TaskState::record_step`.
    pub index: u32,
    pub origin: StepOrigin,
    /// The rationale the planner or remediator gave for this action.
    pub reasoning: String,
    pub capability_name: String,
    pub arguments: Value,
    pub result: StepResult,
    /// Handler invocations performed. Zero when the call was rejected before
    /// invocation (unknown capability, policy, validation) or the step is
    /// synthetic.
    pub attempts: u32,
    /// Absent when verification is disabled or the step is synthetic.
    pub judgement: Option<Judgement>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepRecord {
    /// True when the step failed either at dispatch or at verification.
    pub fn failed(&self) -> bool {
        !self.result.is_success() || self.judgement.as_ref().is_some_and(|j| !j.passed())
    }
}
