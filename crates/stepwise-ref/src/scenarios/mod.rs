//! Runnable end-to-end scenarios.
//!
//! Each scenario scripts a backend, drives a real engine over the reference
//! capabilities and checks the outcome. `run` works inside a caller-supplied
//! directory (tests use a tempdir); `run_scenario` creates its own and prints
//! a short report for the demo CLI.

pub mod human_approval;
pub mod remediation;
pub mod safe_mode;
pub mod write_file;

use stepwise_contracts::{
    step::{StepOrigin, StepResult},
    task::FinalResult,
};

/// The origin of every recorded step, in order.
pub fn origins(result: &FinalResult) -> Vec<StepOrigin> {
    result.history.iter().map(|s| s.origin).collect()
}

fn print_history(result: &FinalResult) {
    for step in &result.history {
        let outcome = match &step.result {
            StepResult::Success { .. } => "ok".to_string(),
            StepResult::Failure(failure) => format!("{:?}: {}", failure.kind, failure.message),
        };
        let judged = match &step.judgement {
            Some(j) if j.passed() => " [verified]",
            Some(_) => " [rejected]",
            None => "",
        };
        println!(
            "    #{} {:<10} {:<11} {}{}",
            step.index,
            format!("{:?}", step.origin),
            step.capability_name,
            outcome,
            judged
        );
    }
}

fn print_summary(result: &FinalResult) {
    println!("  Status:                 {}", result.status);
    if let Some(reason) = &result.termination {
        println!("  Termination:            {:?}", reason);
    }
    println!("  Iterations:             {}", result.iteration_count);
    if let Some(answer) = &result.answer {
        println!("  Answer:                 {}", answer);
    }
    println!("  Steps:");
    print_history(result);
}
