//! # stepwise-core
//!
//! The task execution engine for stepwise.
//!
//! This crate provides:
//! - The trait seams (`ReasoningBackend`, `CapabilityHandler`, `PolicyEngine`,
//!   `ContractValidator`, `TaskStore`)
//! - The `CapabilityRegistry` and the `Dispatcher` that gates every call
//! - The Plan, Verify and Remediate steps and the termination policy
//! - The `Engine` state machine with suspend/resume
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stepwise_core::{CapabilityRegistry, Engine};
//!
//! let engine = Engine::new(Arc::new(registry), backend, policy, validator, store);
//! let result = engine.launch("write X to F", RunConfig::default()).await?;
//! ```

pub mod dispatcher;
pub mod engine;
pub mod planner;
pub mod registry;
pub mod remediator;
pub mod snapshot;
mod structured;
pub mod termination;
pub mod traits;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use engine::Engine;
pub use registry::CapabilityRegistry;
pub use tokio_util::sync::CancellationToken;
