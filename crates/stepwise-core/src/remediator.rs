//! The Remediate step: propose a corrective action after a failed judgement.

use std::sync::Arc;

use tracing::info;

use stepwise_contracts::{
    backend::{BackendPurpose, BackendRequest},
    capability::CapabilityDescriptor,
    decision::Decision,
    error::PlannerError,
    step::StepRecord,
    task::TaskState,
};

use crate::{
    planner::decision_shape,
    structured::request_structured,
    traits::{ContractValidator, ReasoningBackend},
};

pub struct Remediator {
    backend: Arc<dyn ReasoningBackend>,
    validator: Arc<dyn ContractValidator>,
}

impl Remediator {
    pub fn new(backend: Arc<dyn ReasoningBackend>, validator: Arc<dyn ContractValidator>) -> Self {
        Self { backend, validator }
    }

    /// Ask for a decision that repairs `failing`, the most recent step.
    ///
    /// The answer has the planner's shape, so a remediator may also decide
    /// the goal is already met.
    pub async fn remediate(
        &self,
        state: &TaskState,
        failing: &StepRecord,
        capabilities: &[CapabilityDescriptor],
    ) -> Result<Decision, PlannerError> {
        let request = BackendRequest {
            purpose: BackendPurpose::Remediate,
            task_id: state.task_id().to_string(),
            goal: state.goal().to_string(),
            history: state.history().to_vec(),
            capabilities: capabilities.to_vec(),
            subject: Some(failing.clone()),
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
            failed_step = failing.index,
            capability = decision.capability_name().unwrap_or("-"),
            "remediation proposed"
        );
        Ok(decision)
    }
}
