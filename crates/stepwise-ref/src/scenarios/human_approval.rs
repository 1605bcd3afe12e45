//! Scenario 3: Human approval across a restart
//!
//! Under the `careful` preset `ask_human` is an interrupt capability. The
//! planner reads a file, then asks whether to overwrite it; the run pauses
//! and its snapshot goes to a file store. A second engine, built from
//! scratch over a reopened store, resumes it with the operator's reply,
//! which the planner sees as the result of the `ask_human` step.

use std::{path::Path, sync::Arc};

use serde_json::json;

use stepwise_contracts::{
    backend::BackendPurpose,
    step::{StepOrigin, StepResult},
    task::{FinalResult, TaskStatus},
};
use stepwise_store::FileTaskStore;

use crate::{
    backend::{act, finish, ScriptedBackend},
    capabilities::Sandbox,
    error::{ScenarioError, ScenarioResult},
    runtime::{reference_catalog, standard_engine},
};

const SCENARIO: &str = "human_approval";

pub const TARGET: &str = "report.txt";
pub const ORIGINAL: &str = "draft v1\n";
pub const REPLACEMENT: &str = "final v2\n";
pub const QUESTION: &str = "report.txt already has content. Overwrite it?";
pub const REPLY: &str = "yes, overwrite";

#[derive(Debug)]
pub struct ApprovalOutcome {
    pub paused: FinalResult,
    pub resumed: FinalResult,
    pub file_contents: String,
}

pub async fn run(workdir: &Path) -> ScenarioResult<ApprovalOutcome> {
    let catalog = reference_catalog()?;
    let config = catalog.preset("careful")?;
    let sandbox = Arc::new(Sandbox::new(workdir.join("sandbox")));
    let tasks = workdir.join("tasks");

    tokio::fs::create_dir_all(sandbox.root()).await?;
    tokio::fs::write(sandbox.root().join(TARGET), ORIGINAL).await?;

    // ── First process: run until the interrupt ────────────────────────────────

    let paused = {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push(
                BackendPurpose::Plan,
                act("see what is there", "read_file", json!({ "path": TARGET })),
            )
            .push(
                BackendPurpose::Plan,
                act("file exists, ask first", "ask_human", json!({ "question": QUESTION })),
            );
        let store = Arc::new(FileTaskStore::open(&tasks).await?);
        let engine = standard_engine(backend, store, Arc::clone(&sandbox), &catalog)?;
        engine
            .launch(format!("replace the contents of {TARGET}"), config)
            .await?
    };

    if paused.status != TaskStatus::Paused || paused.pending_question.as_deref() != Some(QUESTION) {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!(
                "expected a pause on {QUESTION:?}, got {} ({:?})",
                paused.status, paused.pending_question
            ),
        ));
    }

    // ── Second process: reopen the store and resume ───────────────────────────

    let store = Arc::new(FileTaskStore::open(&tasks).await?);
    if !store.task_ids().await?.contains(&paused.task_id) {
        return Err(ScenarioError::unexpected(SCENARIO, "paused task missing from the store"));
    }

    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push(
            BackendPurpose::Plan,
            act(
                "operator approved",
                "write_file",
                json!({ "path": TARGET, "content": REPLACEMENT }),
            ),
        )
        .push(BackendPurpose::Plan, finish("report replaced", "replaced report.txt"));
    let engine = standard_engine(backend.clone(), store.clone(), Arc::clone(&sandbox), &catalog)?;
    let resumed = engine.resume(&paused.task_id, REPLY).await?;

    if resumed.status != TaskStatus::Completed {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("expected completed, got {} ({:?})", resumed.status, resumed.termination),
        ));
    }
    let expected = [StepOrigin::Planner, StepOrigin::Human, StepOrigin::Planner];
    if super::origins(&resumed) != expected {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("unexpected step origins {:?}", super::origins(&resumed)),
        ));
    }
    let saw_reply = backend
        .requests_for(BackendPurpose::Plan)
        .first()
        .and_then(|r| r.history.get(1).cloned())
        .is_some_and(|s| s.result == StepResult::Success { output: json!(REPLY) });
    if !saw_reply {
        return Err(ScenarioError::unexpected(SCENARIO, "planner never saw the operator reply"));
    }

    let file_contents = tokio::fs::read_to_string(sandbox.root().join(TARGET)).await?;
    Ok(ApprovalOutcome { paused, resumed, file_contents })
}

pub async fn run_scenario() -> ScenarioResult<()> {
    println!("=== Scenario 3: Human approval across a restart ===");
    println!();
    println!("  Preset:                 careful (ask_human interrupts)");

    let workdir = tempfile::tempdir()?;
    let outcome = run(workdir.path()).await?;

    println!("  Phase 1 status:         {}", outcome.paused.status);
    println!("  Pending question:       {}", QUESTION);
    println!("  Operator reply:         {}", REPLY);
    println!("  -- engine rebuilt, store reopened --");
    super::print_summary(&outcome.resumed);
    println!("  File contents:          {:?}", outcome.file_contents);
    println!();
    Ok(())
}
