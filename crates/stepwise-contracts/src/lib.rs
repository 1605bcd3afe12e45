//! # stepwise-contracts
//!
//! Shared types and error definitions for the stepwise task engine.
//!
//! Every crate in the workspace imports from here. No engine logic lives in
//! this crate, only data definitions, the narrow mutators `TaskState` exposes
//! to the engine, and error types.

pub mod backend;
pub mod capability;
pub mod config;
pub mod decision;
pub mod error;
pub mod policy;
pub mod step;
pub mod task;
