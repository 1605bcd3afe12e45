//! The Verify step: did the latest action move the task toward its goal?

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use stepwise_contracts::{
    backend::{BackendPurpose, BackendRequest},
    error::PlannerError,
    step::{Judgement, StepOrigin, StepRecord},
    task::TaskState,
};

use crate::{
    structured::request_structured,
    traits::{ContractValidator, ReasoningBackend},
};

pub fn judgement_shape() -> Value {
    json!({
        "type": "object",
        "required": ["verdict", "rationale"],
        "properties": {
            "verdict": { "enum": ["success", "failure"] },
            "rationale": { "type": "string" }
        }
    })
}

pub struct StepVerifier {
    backend: Arc<dyn ReasoningBackend>,
    validator: Arc<dyn ContractValidator>,
}

impl StepVerifier {
    pub fn new(backend: Arc<dyn ReasoningBackend>, validator: Arc<dyn ContractValidator>) -> Self {
        Self { backend, validator }
    }

    /// Judge `step`, which has not been appended to the history yet.
    ///
    /// Returns `None` without calling the backend when verification is off
    /// for the run or the step is synthetic human feedback.
    pub async fn verify(
        &self,
        state: &TaskState,
        step: &StepRecord,
    ) -> Result<Option<Judgement>, PlannerError> {
        if !state.config().verification || step.origin == StepOrigin::Human {
            debug!(task_id = %state.task_id(), "verification skipped");
            return Ok(None);
        }

        let request = BackendRequest {
            purpose: BackendPurpose::Verify,
            task_id: state.task_id().to_string(),
            goal: state.goal().to_string(),
            history: state.history().to_vec(),
            capabilities: Vec::new(),
            subject: Some(step.clone()),
            expected_shape: judgement_shape(),
            repair: None,
        };

        let judgement: Judgement = request_structured(
            self.backend.as_ref(),
            self.validator.as_ref(),
            request,
            state.config().planner_timeout(),
        )
        .await?;

        info!(
            task_id = %state.task_id(),
            capability = %step.capability_name,
            passed = judgement.passed(),
            "step judged"
        );
        Ok(Some(judgement))
    }
}
