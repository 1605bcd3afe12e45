//! Scenario 2: Safe mode
//!
//! Same goal as scenario 1, but under the `default` preset. Safe mode is on,
//! so the policy gate refuses `write_file` before its handler runs. The
//! refusal is recorded as a failed step, the planner sees it in the history
//! and gives up cleanly.

use std::{path::Path, sync::Arc};

use serde_json::json;

use stepwise_contracts::{
    backend::BackendPurpose,
    step::FailureKind,
    task::{FinalResult, TaskStatus},
};
use stepwise_store::FileTaskStore;

use crate::{
    backend::{act, finish, ScriptedBackend},
    capabilities::Sandbox,
    error::{ScenarioError, ScenarioResult},
    runtime::{reference_catalog, standard_engine},
};

const SCENARIO: &str = "safe_mode";

pub const TARGET: &str = "forbidden.txt";

pub async fn run(workdir: &Path) -> ScenarioResult<FinalResult> {
    let catalog = reference_catalog()?;
    let sandbox = Arc::new(Sandbox::new(workdir.join("sandbox")));
    let store = Arc::new(FileTaskStore::open(workdir.join("tasks")).await?);

    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push(
            BackendPurpose::Plan,
            act("write the file", "write_file", json!({ "path": TARGET, "content": "X" })),
        )
        .push(
            BackendPurpose::Plan,
            finish("writing is not permitted in this run", "could not write the file"),
        );

    let engine = standard_engine(backend.clone(), store, Arc::clone(&sandbox), &catalog)?;
    let result = engine
        .launch(format!("write X to {TARGET}"), catalog.preset("default")?)
        .await?;

    if result.status != TaskStatus::Completed {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("expected completed, got {} ({:?})", result.status, result.termination),
        ));
    }
    let denied = result
        .history
        .first()
        .and_then(|s| s.result.failure())
        .is_some_and(|f| f.kind == FailureKind::PolicyDenied);
    if !denied {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("expected a policy-denied step, got {:?}", result.history),
        ));
    }
    if sandbox.root().join(TARGET).exists() {
        return Err(ScenarioError::unexpected(SCENARIO, "denied write reached the disk"));
    }

    // The planner was told about the refusal.
    let plans = backend.requests_for(BackendPurpose::Plan);
    if plans.last().map_or(true, |r| r.history.len() != 1) {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            "second plan request did not carry the denied step",
        ));
    }
    Ok(result)
}

pub async fn run_scenario() -> ScenarioResult<()> {
    println!("=== Scenario 2: Safe mode ===");
    println!();
    println!("  Preset:                 default (safe mode on)");
    println!("  Attempted:              write_file {}", TARGET);

    let workdir = tempfile::tempdir()?;
    let result = run(workdir.path()).await?;

    super::print_summary(&result);
    println!("  File created:           no");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use stepwise_contracts::{step::FailureKind, task::TaskStatus};

    use super::{run, TARGET};

    #[tokio::test]
    async fn unsafe_write_is_denied_and_nothing_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(dir.path()).await.unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.history.len(), 1);
        let failure = result.history[0].result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::PolicyDenied);
        assert!(failure.message.contains("safe mode"), "got: {}", failure.message);
        assert_eq!(result.history[0].attempts, 0);
        assert!(!dir.path().join("sandbox").join(TARGET).exists());
    }
}
