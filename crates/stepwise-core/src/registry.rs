//! The capability registry.
//!
//! Built once during process initialization by explicit `register` calls,
//! then wrapped in an `Arc` and shared read-only by every run. Nothing on
//! the engine's code path can obtain a `&mut CapabilityRegistry`.

use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::{debug, warn};

use stepwise_contracts::{
    capability::{CapabilityDescriptor, DescriptorManifest},
    config::RunConfig,
    error::{DispatchError, RegistrationError, RegistrationResult},
};

use crate::traits::CapabilityHandler;

struct Entry {
    descriptor: CapabilityDescriptor,
    handler: Arc<dyn CapabilityHandler>,
}

/// Name-keyed set of capabilities and their handlers.
///
/// Entries are kept in name order so `list()` is deterministic, which keeps
/// backend requests reproducible across runs.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, Entry>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability.
    ///
    /// Fails, leaving the registry unchanged, if the descriptor is incomplete
    /// or another capability already uses the same name.
    pub fn register(
        &mut self,
        descriptor: CapabilityDescriptor,
        handler: Arc<dyn CapabilityHandler>,
    ) -> RegistrationResult<()> {
        descriptor.check_complete()?;

        if self.entries.contains_key(&descriptor.name) {
            warn!(capability = %descriptor.name, "duplicate capability registration rejected");
            return Err(RegistrationError::DuplicateName { name: descriptor.name });
        }

        debug!(
            capability = %descriptor.name,
            safety_class = %descriptor.safety_class,
            timeout_ms = descriptor.timeout_ms,
            max_retries = descriptor.max_retries,
            "capability registered"
        );
        self.entries
            .insert(descriptor.name.clone(), Entry { descriptor, handler });
        Ok(())
    }

    /// Add a capability declared in a manifest.
    pub fn register_manifest(
        &mut self,
        manifest: DescriptorManifest,
        handler: Arc<dyn CapabilityHandler>,
    ) -> RegistrationResult<()> {
        let descriptor = CapabilityDescriptor::try_from(manifest)?;
        self.register(descriptor, handler)
    }

    /// Look up a capability by name.
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<(&CapabilityDescriptor, Arc<dyn CapabilityHandler>), DispatchError> {
        self.entries
            .get(name)
            .map(|e| (&e.descriptor, Arc::clone(&e.handler)))
            .ok_or_else(|| DispatchError::CapabilityNotFound { name: name.to_string() })
    }

    pub fn descriptor(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    /// All descriptors, in name order.
    pub fn list(&self) -> Vec<&CapabilityDescriptor> {
        self.entries.values().map(|e| &e.descriptor).collect()
    }

    /// Descriptors the run's allow/deny list permits, in name order.
    pub fn list_permitted(&self, config: &RunConfig) -> Vec<CapabilityDescriptor> {
        self.entries
            .values()
            .filter(|e| config.capabilities.permits(&e.descriptor.name))
            .map(|e| e.descriptor.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
