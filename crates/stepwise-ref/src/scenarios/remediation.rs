//! Scenario 4: Verification and remediation
//!
//! Under the `verified` preset every executed step is judged. The planner's
//! first write is wrong; the verifier rejects it and the remediator issues a
//! corrective write, which passes. A second run shows the bound: a verifier
//! that never approves cannot keep the remediator going past the iteration
//! budget.

use std::{path::Path, sync::Arc};

use serde_json::json;

use stepwise_contracts::{
    backend::BackendPurpose,
    step::StepOrigin,
    task::{FinalResult, TaskStatus, TerminationReason},
};
use stepwise_store::InMemoryTaskStore;

use crate::{
    backend::{act, finish, judge, ScriptedBackend},
    capabilities::Sandbox,
    error::{ScenarioError, ScenarioResult},
    runtime::{reference_catalog, standard_engine},
};

const SCENARIO: &str = "remediation";

pub const TARGET: &str = "answer.txt";
pub const WRONG: &str = "41";
pub const RIGHT: &str = "42";

fn write(reasoning: &str, content: &str) -> serde_json::Value {
    act(reasoning, "write_file", json!({ "path": TARGET, "content": content }))
}

/// One rejected step, one successful remediation.
pub async fn run(workdir: &Path) -> ScenarioResult<FinalResult> {
    let catalog = reference_catalog()?;
    let sandbox = Arc::new(Sandbox::new(workdir.join("sandbox")));

    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push(BackendPurpose::Plan, write("write the answer", WRONG))
        .push(BackendPurpose::Plan, finish("verified answer on disk", RIGHT))
        .push(BackendPurpose::Verify, judge(false, "the answer must be 42"))
        .push(BackendPurpose::Verify, judge(true, "file holds 42"))
        .push(BackendPurpose::Remediate, write("correct the answer", RIGHT));

    let engine = standard_engine(
        backend.clone(),
        Arc::new(InMemoryTaskStore::new()),
        Arc::clone(&sandbox),
        &catalog,
    )?;
    let result = engine
        .launch(format!("write the answer to {TARGET}"), catalog.preset("verified")?)
        .await?;

    if result.status != TaskStatus::Completed {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("expected completed, got {} ({:?})", result.status, result.termination),
        ));
    }
    if super::origins(&result) != [StepOrigin::Planner, StepOrigin::Remediator] {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("unexpected step origins {:?}", super::origins(&result)),
        ));
    }
    let contents = tokio::fs::read_to_string(sandbox.root().join(TARGET)).await?;
    if contents != RIGHT {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("file holds {contents:?} after remediation"),
        ));
    }
    if backend.remaining(BackendPurpose::Verify) != 0 {
        return Err(ScenarioError::unexpected(SCENARIO, "not every step was verified"));
    }
    Ok(result)
}

/// A verifier that always rejects; the run must still end.
pub async fn run_bounded(workdir: &Path) -> ScenarioResult<FinalResult> {
    let catalog = reference_catalog()?;
    let sandbox = Arc::new(Sandbox::new(workdir.join("sandbox")));

    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push(BackendPurpose::Plan, write("write the answer", WRONG))
        .always(BackendPurpose::Verify, judge(false, "still wrong"))
        .always(BackendPurpose::Remediate, write("try again", WRONG));

    let engine = standard_engine(
        backend,
        Arc::new(InMemoryTaskStore::new()),
        sandbox,
        &catalog,
    )?;
    let result = engine
        .launch(format!("write the answer to {TARGET}"), catalog.preset("verified")?)
        .await?;

    if result.termination != Some(TerminationReason::BudgetExhausted) {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("expected the budget to end the run, got {:?}", result.termination),
        ));
    }
    Ok(result)
}

pub async fn run_scenario() -> ScenarioResult<()> {
    println!("=== Scenario 4: Verification and remediation ===");
    println!();
    println!("  Preset:                 verified (every step judged, 4 iterations)");

    let workdir = tempfile::tempdir()?;

    println!();
    println!("  Run A: one rejection, then a corrective step");
    let repaired = run(workdir.path()).await?;
    super::print_summary(&repaired);

    println!();
    println!("  Run B: verifier never satisfied");
    let bounded = run_bounded(&workdir.path().join("bounded")).await?;
    super::print_summary(&bounded);
    println!();
    Ok(())
}
