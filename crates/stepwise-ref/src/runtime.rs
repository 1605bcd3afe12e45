//! Assembles a ready-to-run engine from the reference parts.

use std::sync::Arc;

use tracing::info;

use stepwise_contracts::error::{ConfigResult, RegistrationResult};
use stepwise_core::{
    traits::{ReasoningBackend, TaskStore},
    CapabilityRegistry, Engine,
};
use stepwise_policy::PresetCatalog;
use stepwise_verify::SchemaValidator;

use crate::capabilities::{register_reference_capabilities, Sandbox};

/// Presets shipped with the reference runtime.
pub const REFERENCE_PRESETS: &str = include_str!("../presets/reference.toml");

pub fn reference_catalog() -> ConfigResult<PresetCatalog> {
    PresetCatalog::from_toml_str(REFERENCE_PRESETS)
}

/// An engine with the reference capabilities, the catalog's policy and a
/// JSON Schema validator.
pub fn standard_engine(
    backend: Arc<dyn ReasoningBackend>,
    store: Arc<dyn TaskStore>,
    sandbox: Arc<Sandbox>,
    catalog: &PresetCatalog,
) -> RegistrationResult<Engine> {
    let mut registry = CapabilityRegistry::new();
    register_reference_capabilities(&mut registry, Arc::clone(&sandbox), catalog)?;
    info!(
        capabilities = registry.len(),
        sandbox = %sandbox.root().display(),
        "reference engine assembled"
    );

    Ok(Engine::new(
        Arc::new(registry),
        backend,
        Arc::new(catalog.policy()),
        Arc::new(SchemaValidator::new()),
        store,
    ))
}
