//! # stepwise-policy
//!
//! The capability policy gate and TOML run presets for stepwise.
//!
//! ## Overview
//!
//! [`CapabilityPolicy`] implements the
//! [`PolicyEngine`](stepwise_core::traits::PolicyEngine) trait: it refuses
//! unsafe capabilities in safe mode and applies the run's allow/deny list,
//! plus an optional process-wide deny list.
//!
//! [`PresetCatalog`] loads named `RunConfig` presets and capability
//! manifests from a TOML file.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use stepwise_policy::PresetCatalog;
//!
//! let catalog = PresetCatalog::from_file(Path::new("stepwise.toml"))?;
//! let config = catalog.preset("careful")?;
//! let policy = catalog.policy();
//! ```

pub mod engine;
pub mod preset;

pub use engine::CapabilityPolicy;
pub use preset::{PolicySection, PresetCatalog};

// ── Tests ─────────────────────────────────────────────────────────────────────
