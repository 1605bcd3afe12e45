//! Snapshot codec for paused tasks.
//!
//! A snapshot is a JSON envelope around the full `TaskState` plus a SHA-256
//! hash chain over its history, so a truncated, reordered or edited history
//! is rejected on load instead of being resumed.
//!
//! Hash input layout for step `n` (bytes, in order):
//!   1. task_id as UTF-8 bytes
//!   2. index as 4-byte little-endian
//!   3. hash of step `n - 1` (or `GENESIS_HASH`) as UTF-8 hex
//!   4. compact JSON of the step record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use stepwise_contracts::{
    error::{EngineError, EngineResult},
    step::StepRecord,
    task::{TaskId, TaskState},
};

pub const FORMAT_VERSION: u32 = 1;

/// The `prev` hash of the first step.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    task: TaskState,
    history_chain: Vec<String>,
    saved_at: DateTime<Utc>,
}

/// Lowercase hex SHA-256 of one step, linked to its predecessor.
pub fn hash_step(
    task_id: &TaskId,
    index: u32,
    record: &StepRecord,
    prev_hash: &str,
) -> Result<String, serde_json::Error> {
    let record_json = serde_json::to_vec(record)?;

    let mut hasher = Sha256::new();
    hasher.update(task_id.to_string().as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// The hash of every step in `state`'s history, in order.
pub fn history_chain(state: &TaskState) -> Result<Vec<String>, serde_json::Error> {
    let mut prev = GENESIS_HASH.to_string();
    let mut chain = Vec::with_capacity(state.history().len());
    for record in state.history() {
        prev = hash_step(state.task_id(), record.index, record, &prev)?;
        chain.push(prev.clone());
    }
    Ok(chain)
}

pub fn encode(state: &TaskState) -> EngineResult<Vec<u8>> {
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        history_chain: history_chain(state).map_err(snapshot_error)?,
        task: state.clone(),
        saved_at: Utc::now(),
    };
    serde_json::to_vec_pretty(&envelope).map_err(snapshot_error)
}

/// Decode a snapshot and check its version and history chain.
pub fn decode(bytes: &[u8]) -> EngineResult<TaskState> {
    let envelope: Envelope = serde_json::from_slice(bytes).map_err(snapshot_error)?;

    if envelope.format_version != FORMAT_VERSION {
        return Err(EngineError::Snapshot {
            reason: format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                envelope.format_version
            ),
        });
    }

    let recomputed = history_chain(&envelope.task).map_err(snapshot_error)?;
    if recomputed != envelope.history_chain {
        let at = recomputed
            .iter()
            .zip(&envelope.history_chain)
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| recomputed.len().min(envelope.history_chain.len()));
        return Err(EngineError::Snapshot {
            reason: format!("history chain broken at step {at}"),
        });
    }

    Ok(envelope.task)
}

fn snapshot_error(e: serde_json::Error) -> EngineError {
    EngineError::Snapshot { reason: e.to_string() }
}
