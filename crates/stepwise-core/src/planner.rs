//! The Plan step.
//!
//! Turns the current task state into a backend request and returns a
//! validated `Decision`. Backend failures, timeouts and unrepairable output
//! are `PlannerError`s, which end the run.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use stepwise_contracts::{
    backend::{BackendPurpose, BackendRequest},
    capability::CapabilityDescriptor,
    decision::Decision,
    error::PlannerError,
    task::TaskState,
};

use crate::{
    structured::request_structured,
    traits::{ContractValidator, ReasoningBackend},
};

/// JSON Schema every planner and remediator answer must satisfy.
pub fn decision_shape() -> Value {
    json!({
        "type": "object",
        "required": ["type", "reasoning"],
        "properties": {
            "type": { "enum": ["act", "finish"] },
            "reasoning": { "type": "string" },
            "capability_name": { "type": "string", "minLength": 1 },
            "arguments": { "type": "object" },
            "answer": { "type": ["string", "null"] }
        },
        "if": { "properties": { "type": { "const": "act" } } },
        "then": { "required": ["capability_name", "arguments"] }
    })
}

pub struct Planner {
    backend: Arc<dyn ReasoningBackend>,
    validator: Arc<dyn ContractValidator>,
}

impl Planner {
    pub fn new(backend: Arc<dyn ReasoningBackend>, validator: Arc<dyn ContractValidator>) -> Self {
        Self { backend, validator }
    }

    /// Ask the backend for the next decision.
    pub async fn plan(
        &self,
        state: &TaskState,
        capabilities: &[CapabilityDescriptor],
    ) -> Result<Decision, PlannerError> {
        let request = BackendRequest {
            purpose: BackendPurpose::Plan,
            task_id: state.task_id().to_string(),
            goal: state.goal().to_string(),
            history: state.history().to_vec(),
            capabilities: capabilities.to_vec(),
            subject: None,
            expected_shape: decision_shape(),
            repair: None,
        };

        let decision: Decision = request_structured(
            self.backend.as_ref(),
            self.validator.as_ref(),
            request,
            state.config().planner_timeout(),
        )
        .await?;

        info!(
            task_id = %state.task_id(),
            iteration = state.iteration_count(),
            capability = decision.capability_name().unwrap_or("-"),
            "planner decided"
        );
        Ok(decision)
    }
}
