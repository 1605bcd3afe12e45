//! A scripted reasoning backend.
//!
//! Stands in for an LLM service. Answers are queued per purpose and handed
//! out in order; a purpose can also carry a standing answer used once its
//! queue is empty. Every request is recorded for later inspection.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use stepwise_contracts::{
    backend::{BackendPurpose, BackendRequest},
    error::BackendError,
};
use stepwise_core::traits::ReasoningBackend;

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<BackendPurpose, VecDeque<Value>>,
    standing: HashMap<BackendPurpose, Value>,
    requests: Vec<BackendRequest>,
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one answer for `purpose`.
    pub fn push(&self, purpose: BackendPurpose, answer: Value) -> &Self {
        self.lock()
            .queued
            .entry(purpose)
            .or_default()
            .push_back(answer);
        self
    }

    /// Answer `purpose` with `answer` whenever its queue is empty.
    pub fn always(&self, purpose: BackendPurpose, answer: Value) -> &Self {
        self.lock().standing.insert(purpose, answer);
        self
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_for(&self, purpose: BackendPurpose) -> Vec<BackendRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.purpose == purpose)
            .cloned()
            .collect()
    }

    /// Queued answers not yet handed out.
    pub fn remaining(&self, purpose: BackendPurpose) -> usize {
        self.lock().queued.get(&purpose).map_or(0, VecDeque::len)
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn complete(&self, request: &BackendRequest) -> Result<Value, BackendError> {
        let mut script = self.lock();
        script.requests.push(request.clone());

        let answer = script
            .queued
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front)
            .or_else(|| script.standing.get(&request.purpose).cloned());

        debug!(
            task_id = %request.task_id,
            purpose = %request.purpose,
            repair = request.is_repair(),
            answered = answer.is_some(),
            "scripted backend request"
        );
        answer.ok_or_else(|| BackendError::Exhausted(format!("script has no {} answer", request.purpose)))
    }
}

// ── Answer builders ───────────────────────────────────────────────────────────

/// A decision to invoke `capability` with `arguments`.
pub fn act(reasoning: &str, capability: &str, arguments: Value) -> Value {
    json!({
        "type": "act",
        "reasoning": reasoning,
        "capability_name": capability,
        "arguments": arguments,
    })
}

/// A decision that the goal is satisfied.
pub fn finish(reasoning: &str, answer: &str) -> Value {
    json!({ "type": "finish", "reasoning": reasoning, "answer": answer })
}

/// A verifier judgement.
pub fn judge(passed: bool, rationale: &str) -> Value {
    json!({
        "verdict": if passed { "success" } else { "failure" },
        "rationale": rationale,
    })
}
