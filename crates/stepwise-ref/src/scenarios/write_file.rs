//! Scenario 1: Write a file
//!
//! The planner writes one file and then declares the goal met. Runs under
//! the `writer` preset, which turns safe mode off so the unsafe
//! `write_file` capability is allowed.

use std::{path::Path, sync::Arc};

use serde_json::json;

use stepwise_contracts::{
    backend::BackendPurpose,
    task::{FinalResult, TaskStatus},
};
use stepwise_store::FileTaskStore;

use crate::{
    backend::{act, finish, ScriptedBackend},
    capabilities::Sandbox,
    error::{ScenarioError, ScenarioResult},
    runtime::{reference_catalog, standard_engine},
};

const SCENARIO: &str = "write_file";

pub const TARGET: &str = "notes/greeting.txt";
pub const CONTENT: &str = "hello from stepwise\n";

pub async fn run(workdir: &Path) -> ScenarioResult<FinalResult> {
    let catalog = reference_catalog()?;
    let sandbox = Arc::new(Sandbox::new(workdir.join("sandbox")));
    let store = Arc::new(FileTaskStore::open(workdir.join("tasks")).await?);

    let backend = Arc::new(ScriptedBackend::new());
    backend
        .push(
            BackendPurpose::Plan,
            act("write the greeting", "write_file", json!({ "path": TARGET, "content": CONTENT })),
        )
        .push(BackendPurpose::Plan, finish("the greeting is on disk", "wrote the greeting"));

    let engine = standard_engine(backend, store, Arc::clone(&sandbox), &catalog)?;
    let result = engine
        .launch(format!("write a greeting to {TARGET}"), catalog.preset("writer")?)
        .await?;

    if result.status != TaskStatus::Completed {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("expected completed, got {} ({:?})", result.status, result.termination),
        ));
    }
    if result.history.len() != 1 || !result.history[0].result.is_success() {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("expected one successful step, got {:?}", result.history),
        ));
    }

    let written = tokio::fs::read_to_string(sandbox.root().join(TARGET)).await?;
    if written != CONTENT {
        return Err(ScenarioError::unexpected(
            SCENARIO,
            format!("file holds {written:?}, expected {CONTENT:?}"),
        ));
    }
    Ok(result)
}

pub async fn run_scenario() -> ScenarioResult<()> {
    println!("=== Scenario 1: Write a file ===");
    println!();
    println!("  Preset:                 writer (safe mode off)");
    println!("  Target:                 {}", TARGET);

    let workdir = tempfile::tempdir()?;
    let result = run(workdir.path()).await?;

    super::print_summary(&result);
    println!("  File contents:          {:?}", CONTENT);
    println!();
    Ok(())
}
