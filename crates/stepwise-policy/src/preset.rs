//! Run presets and capability manifests loaded from TOML.
//!
//! Example:
//! ```toml
//! [policy]
//! deny = ["shell*"]
//!
//! [presets.careful]
//! max_iterations = 5
//! safe_mode = true
//! interrupt_capabilities = ["ask_human"]
//!
//! [presets.careful.capabilities]
//! allow = ["read_file", "echo", "ask_human"]
//!
//! [[capabilities]]
//! name = "echo"
//! description = "Echo the text argument back"
//! safety_class = "safe"
//! timeout_ms = 1000
//! max_retries = 0
//! input_contract = { type = "object", required = ["text"] }
//! ```
//!
//! Fields left out of a preset take the `RunConfig` defaults.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use stepwise_contracts::{
    capability::DescriptorManifest,
    config::RunConfig,
    error::{ConfigError, ConfigResult},
};

use crate::engine::CapabilityPolicy;

/// Process-wide policy settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Capability patterns refused in every run.
    pub deny: Vec<String>,
}

/// Named run configurations plus capability manifests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetCatalog {
    pub policy: PolicySection,
    pub presets: BTreeMap<String, RunConfig>,
    pub capabilities: Vec<DescriptorManifest>,
}

impl PresetCatalog {
    /// Parse `s` as TOML and check every preset.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let catalog: PresetCatalog = toml::from_str(s).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        catalog.validate()?;
        debug!(
            presets = catalog.presets.len(),
            capabilities = catalog.capabilities.len(),
            "preset catalog loaded"
        );
        Ok(catalog)
    }

    /// Read the file at `path` and parse it as a preset catalog.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// A copy of the named preset, ready to pass to `Engine::launch`.
    pub fn preset(&self, name: &str) -> ConfigResult<RunConfig> {
        self.presets
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownPreset { name: name.to_string() })
    }

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    /// The manifest declared for capability `name`, if any.
    pub fn manifest(&self, name: &str) -> Option<&DescriptorManifest> {
        self.capabilities
            .iter()
            .find(|m| m.name.as_deref() == Some(name))
    }

    /// The policy gate configured by the `[policy]` table.
    pub fn policy(&self) -> CapabilityPolicy {
        CapabilityPolicy::new().with_global_deny(self.policy.deny.iter().cloned())
    }

    fn validate(&self) -> ConfigResult<()> {
        for (name, preset) in &self.presets {
            if preset.max_iterations == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("preset '{name}': max_iterations must be at least 1"),
                });
            }
            if preset.planner_timeout_ms == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("preset '{name}': planner_timeout_ms must be positive"),
                });
            }
            if let Some(interrupt) = preset
                .interrupt_capabilities
                .iter()
                .find(|c| !preset.capabilities.permits(c))
            {
                return Err(ConfigError::Invalid {
                    reason: format!(
                        "preset '{name}': interrupt capability '{interrupt}' is not permitted by its filter"
                    ),
                });
            }
        }
        Ok(())
    }
}
