//! Mock collaborators shared by the unit tests of this crate.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;

use stepwise_contracts::{
    backend::{BackendPurpose, BackendRequest},
    error::{BackendError, StoreError, StoreResult},
    policy::{PolicyContext, PolicyVerdict},
    task::TaskId,
};

use crate::traits::{ContractValidator, PolicyEngine, ReasoningBackend, TaskStore};

// ── Policy ───────────────────────────────────────────────────────────────────

/// A policy that always returns a pre-configured verdict.
pub struct MockPolicy {
    pub verdict: PolicyVerdict,
}

impl MockPolicy {
    pub fn allow() -> Self {
        Self { verdict: PolicyVerdict::Allow }
    }
}

impl PolicyEngine for MockPolicy {
    fn evaluate(&self, _ctx: &PolicyContext) -> PolicyVerdict {
        self.verdict.clone()
    }
}

// ── Validator ────────────────────────────────────────────────────────────────

/// Checks only the top-level `required` list and `enum` properties of the
/// contract. Enough to exercise the repair path without a schema engine.
pub struct RequiredKeysValidator;

impl ContractValidator for RequiredKeysValidator {
    fn validate(&self, contract: &Value, instance: &Value) -> Result<(), Vec<String>> {
        if !instance.is_object() {
            return Err(vec![format!("{instance} is not an object")]);
        }
        let mut violations: Vec<String> = contract["required"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|key| instance.get(*key).is_none())
            .map(|key| format!("missing property '{key}'"))
            .collect();

        if let Some(props) = contract["properties"].as_object() {
            for (key, prop) in props {
                let (Some(allowed), Some(actual)) = (prop["enum"].as_array(), instance.get(key))
                else {
                    continue;
                };
                if !allowed.contains(actual) {
                    violations.push(format!("property '{key}' has disallowed value {actual}"));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// A backend answering from per-purpose queues and recording every request.
///
/// An empty queue answers `BackendError::Exhausted`.
#[derive(Default)]
pub struct MockBackend {
    queues: Mutex<HashMap<BackendPurpose, VecDeque<Result<Value, BackendError>>>>,
    pub requests: Arc<Mutex<Vec<BackendRequest>>>,
    pub delay: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn push(&self, purpose: BackendPurpose, answer: Value) -> &Self {
        self.push_result(purpose, Ok(answer))
    }

    pub fn push_result(&self, purpose: BackendPurpose, answer: Result<Value, BackendError>) -> &Self {
        self.queues
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(answer);
        self
    }

    pub fn requests_for(&self, purpose: BackendPurpose) -> Vec<BackendRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.purpose == purpose)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReasoningBackend for MockBackend {
    async fn complete(&self, request: &BackendRequest) -> Result<Value, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Err(BackendError::Exhausted(format!("no {} answer", request.purpose))))
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub entries: Mutex<HashMap<TaskId, Vec<u8>>>,
    pub fail_saves: bool,
    /// Sleep before `take` touches the map, to widen race windows.
    pub take_delay: Duration,
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn save(&self, task_id: &TaskId, snapshot: &[u8]) -> StoreResult<()> {
        if self.fail_saves {
            return Err(StoreError::Io { reason: "disk full".to_string() });
        }
        self.entries
            .lock()
            .unwrap()
            .insert(task_id.clone(), snapshot.to_vec());
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> StoreResult<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { task_id: task_id.to_string() })
    }

    async fn take(&self, task_id: &TaskId) -> StoreResult<Vec<u8>> {
        if !self.take_delay.is_zero() {
            tokio::time::sleep(self.take_delay).await;
        }
        self.entries
            .lock()
            .unwrap()
            .remove(task_id)
            .ok_or_else(|| StoreError::NotFound { task_id: task_id.to_string() })
    }

    async fn delete(&self, task_id: &TaskId) -> StoreResult<bool> {
        Ok(self.entries.lock().unwrap().remove(task_id).is_some())
    }
}
