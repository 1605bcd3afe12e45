//! # stepwise-ref
//!
//! Reference runtime for the stepwise task engine.
//!
//! Wires the engine to concrete parts and exercises it end to end:
//!
//! - [`backend::ScriptedBackend`]: a reasoning backend that replays scripted
//!   answers, standing in for an LLM service.
//! - [`capabilities`]: `write_file`, `read_file`, `echo` and `ask_human`,
//!   confined to a sandbox directory.
//! - [`runtime`]: the bundled presets and an engine assembled from the
//!   policy, validator and store crates.
//! - [`scenarios`]: four runnable scenarios used by the `demo` binary.
//!
//! 1. **Write a file**: unsafe capability allowed, goal satisfied.
//! 2. **Safe mode**: the same write refused by policy, nothing touches disk.
//! 3. **Human approval**: pause on `ask_human`, restart, resume with the
//!    operator's reply.
//! 4. **Remediation**: a rejected step corrected, and a run whose verifier is
//!    never satisfied stopped by its iteration budget.
//!
//! No network access; every file lives under a temporary directory.

pub mod backend;
pub mod capabilities;
pub mod error;
pub mod runtime;
pub mod scenarios;

pub use backend::ScriptedBackend;
pub use capabilities::{register_file_capabilities, register_reference_capabilities, Sandbox};
pub use error::{ScenarioError, ScenarioResult};
pub use runtime::{reference_catalog, standard_engine, REFERENCE_PRESETS};
