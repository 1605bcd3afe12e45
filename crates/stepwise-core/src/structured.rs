//! Structured calls to the reasoning backend.
//!
//! Shared by the planner, verifier and remediator: send a request, check the
//! answer against `expected_shape`, deserialize it, and on a malformed answer
//! issue exactly one repair request before giving up.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use stepwise_contracts::{
    backend::{BackendRequest, RepairContext},
    error::PlannerError,
};

use crate::traits::{ContractValidator, ReasoningBackend};

pub(crate) async fn request_structured<T: DeserializeOwned>(
    backend: &dyn ReasoningBackend,
    validator: &dyn ContractValidator,
    mut request: BackendRequest,
    limit: Duration,
) -> Result<T, PlannerError> {
    let raw = call(backend, &request, limit).await?;
    let reason = match interpret(validator, &request.expected_shape, &raw) {
        Ok(answer) => return Ok(answer),
        Err(reason) => reason,
    };

    warn!(
        task_id = %request.task_id,
        stage = %request.purpose,
        error = %reason,
        "malformed backend answer, requesting repair"
    );
    request.repair = Some(RepairContext {
        malformed_output: raw,
        error: reason,
    });

    let repaired = call(backend, &request, limit).await?;
    interpret(validator, &request.expected_shape, &repaired).map_err(|reason| {
        PlannerError::Unrepairable {
            stage: request.purpose,
            reason,
        }
    })
}

async fn call(
    backend: &dyn ReasoningBackend,
    request: &BackendRequest,
    limit: Duration,
) -> Result<Value, PlannerError> {
    debug!(
        task_id = %request.task_id,
        stage = %request.purpose,
        repair = request.is_repair(),
        "calling reasoning backend"
    );
    match timeout(limit, backend.complete(request)).await {
        Ok(Ok(raw)) => Ok(raw),
        Ok(Err(source)) => Err(PlannerError::Backend {
            stage: request.purpose,
            source,
        }),
        Err(_) => Err(PlannerError::Timeout {
            stage: request.purpose,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Validate then deserialize. Backends that answer with JSON text instead of
/// a JSON value are accepted.
fn interpret<T: DeserializeOwned>(
    validator: &dyn ContractValidator,
    shape: &Value,
    raw: &Value,
) -> Result<T, String> {
    let parsed;
    let value = match raw {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(e) => return Err(format!("answer is not valid JSON: {e}")),
        },
        other => other,
    };

    validator
        .validate(shape, value)
        .map_err(|violations| violations.join("; "))?;

    T::deserialize(value).map_err(|e| format!("answer does not match the expected shape: {e}"))
}
