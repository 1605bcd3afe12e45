//! JSON Schema contract validation.
//!
//! `SchemaValidator` implements the `ContractValidator` trait from
//! `stepwise-core`. It is used twice per cycle: on capability arguments
//! before a handler runs, and on every structured answer from the reasoning
//! backend.
//!
//! Compiled schemas are cached by their canonical JSON text, so the decision
//! shape and each capability contract are compiled once per process.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, warn};

use stepwise_core::traits::ContractValidator;

#[derive(Default)]
pub struct SchemaValidator {
    compiled: Mutex<HashMap<String, Arc<Validator>>>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `contract`, or fetch it from the cache.
    fn compile(&self, contract: &Value) -> Result<Arc<Validator>, String> {
        let key = contract.to_string();
        if let Some(hit) = self
            .compiled
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).cloned())
        {
            return Ok(hit);
        }

        let validator = jsonschema::validator_for(contract)
            .map(Arc::new)
            .map_err(|e| format!("invalid JSON Schema document: {e}"))?;
        debug!(schema_bytes = key.len(), "compiled contract schema");

        if let Ok(mut cache) = self.compiled.lock() {
            cache.insert(key, Arc::clone(&validator));
        }
        Ok(validator)
    }

    pub fn cached_schemas(&self) -> usize {
        self.compiled.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("cached_schemas", &self.cached_schemas())
            .finish()
    }
}

impl ContractValidator for SchemaValidator {
    /// Validate `instance` against `contract`, collecting every violation.
    ///
    /// A contract that does not compile is reported as a single violation so
    /// the call is refused rather than silently allowed.
    fn validate(&self, contract: &Value, instance: &Value) -> Result<(), Vec<String>> {
        let validator = match self.compile(contract) {
            Ok(v) => v,
            Err(message) => {
                warn!(%message, "contract schema failed to compile");
                return Err(vec![message]);
            }
        };

        let violations: Vec<String> = validator
            .iter_errors(instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                let at = if path.is_empty() { "/" } else { path.as_str() };
                format!("{error} (at {at})")
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            debug!(count = violations.len(), "contract violations found");
            Err(violations)
        }
    }
}
