//! stepwise reference runtime demo CLI
//!
//! Runs one or all of the reference scenarios. Each scenario drives the real
//! engine (planner, dispatcher, policy gate, verifier, file store) against a
//! scripted reasoning backend inside a temporary sandbox.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- write-file
//!   cargo run -p demo -- safe-mode
//!   cargo run -p demo -- human-approval
//!   cargo run -p demo -- remediation

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use stepwise_ref::{
    scenarios::{human_approval, remediation, safe_mode, write_file},
    ScenarioResult,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// stepwise: autonomous task execution with bounded, auditable runs.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "stepwise reference runtime demo",
    long_about = "Runs stepwise demo scenarios showing the plan/execute loop,\n\
                  safe-mode policy, human-in-the-loop pause and resume,\n\
                  and verifier-driven remediation."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four scenarios in sequence.
    RunAll,
    /// Scenario 1: write a file and finish.
    WriteFile,
    /// Scenario 2: the same write refused in safe mode.
    SafeMode,
    /// Scenario 3: pause for approval, restart, resume.
    HumanApproval,
    /// Scenario 4: verifier rejection and remediation.
    Remediation,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for the engine's node-by-node trace.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::WriteFile => write_file::run_scenario().await,
        Command::SafeMode => safe_mode::run_scenario().await,
        Command::HumanApproval => human_approval::run_scenario().await,
        Command::Remediation => remediation::run_scenario().await,
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_all() -> ScenarioResult<()> {
    debug!("running every scenario");
    write_file::run_scenario().await?;
    safe_mode::run_scenario().await?;
    human_approval::run_scenario().await?;
    remediation::run_scenario().await?;
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("stepwise: Autonomous Task Execution Engine");
    println!("Reference Demo");
    println!("==========================================");
    println!();
    println!("Per iteration:");
    println!("  [1] Planner asks the reasoning backend for the next decision (act / finish)");
    println!("  [2] Interrupt capabilities pause the run; the snapshot is stored durably");
    println!("  [3] Dispatcher: resolve, policy gate, argument contract, timeout and retries");
    println!("  [4] Optional verifier judges the step; a rejection goes to the remediator");
    println!("  [5] Termination policy checks the iteration budget and the run deadline");
    println!();
}
