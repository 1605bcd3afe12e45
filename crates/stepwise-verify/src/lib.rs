//! # stepwise-verify
//!
//! Contract validation for stepwise.
//!
//! This crate provides [`engine::SchemaValidator`], which implements the
//! [`stepwise_core::traits::ContractValidator`] trait using the `jsonschema`
//! crate.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use stepwise_verify::SchemaValidator;
//!
//! let validator = Arc::new(SchemaValidator::new());
//! let engine = Engine::new(registry, backend, policy, validator, store);
//! ```

pub mod engine;

pub use engine::SchemaValidator;
