//! Capability descriptors: the contract every registered action satisfies.
//!
//! A descriptor is registered once at startup together with its handler and
//! is read-only afterwards. Descriptors declared in configuration files go
//! through `DescriptorManifest`, whose fields are all optional so a missing
//! field is reported instead of silently defaulted.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistrationError;

/// Whether a capability may run while a task is in safe mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyClass {
    Safe,
    /// Has side effects outside the sandbox; refused when `safe_mode` is on.
    Unsafe,
}

impl fmt::Display for SafetyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyClass::Safe => f.write_str("safe"),
            SafetyClass::Unsafe => f.write_str("unsafe"),
        }
    }
}

impl FromStr for SafetyClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(SafetyClass::Safe),
            "unsafe" => Ok(SafetyClass::Unsafe),
            other => Err(other.to_string()),
        }
    }
}

/// A registry entry: name, input contract and execution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique key. Planner decisions refer to capabilities by this name.
    pub name: String,
    /// One-line summary advertised to the reasoning backend.
    pub description: String,
    /// JSON Schema the arguments are validated against before invocation.
    pub input_contract: Value,
    pub safety_class: SafetyClass,
    /// Per-attempt time limit, in milliseconds.
    pub timeout_ms: u64,
    /// Extra attempts allowed after a timeout.
    pub max_retries: u32,
}

impl CapabilityDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_contract: Value,
        safety_class: SafetyClass,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_contract,
            safety_class,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            max_retries,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Worst-case wall-clock time for one dispatch, retries included.
    pub fn worst_case(&self) -> Duration {
        self.timeout().saturating_mul(self.max_retries.saturating_add(1))
    }

    /// Check that every field carries a usable value.
    pub fn check_complete(&self) -> Result<(), RegistrationError> {
        if self.name.trim().is_empty() {
            return Err(RegistrationError::MissingField { field: "name" });
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(RegistrationError::InvalidDescriptor {
                name: self.name.clone(),
                reason: "name must not contain whitespace".to_string(),
            });
        }
        if self.description.trim().is_empty() {
            return Err(RegistrationError::MissingField { field: "description" });
        }
        if self.input_contract.is_null() {
            return Err(RegistrationError::MissingField { field: "input_contract" });
        }
        if !self.input_contract.is_object() {
            return Err(RegistrationError::InvalidDescriptor {
                name: self.name.clone(),
                reason: "input_contract must be a JSON Schema object".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(RegistrationError::MissingField { field: "timeout_ms" });
        }
        Ok(())
    }
}

/// A descriptor as written in a TOML or JSON manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorManifest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub input_contract: Option<Value>,
    pub safety_class: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

impl TryFrom<DescriptorManifest> for CapabilityDescriptor {
    type Error = RegistrationError;

    fn try_from(m: DescriptorManifest) -> Result<Self, Self::Error> {
        let name = m.name.ok_or(RegistrationError::MissingField { field: "name" })?;
        let description = m
            .description
            .ok_or(RegistrationError::MissingField { field: "description" })?;
        let input_contract = m
            .input_contract
            .ok_or(RegistrationError::MissingField { field: "input_contract" })?;
        let raw_class = m
            .safety_class
            .ok_or(RegistrationError::MissingField { field: "safety_class" })?;
        let safety_class = raw_class
            .parse::<SafetyClass>()
            .map_err(|value| RegistrationError::UnknownSafetyClass {
                name: name.clone(),
                value,
            })?;
        let timeout_ms = m
            .timeout_ms
            .ok_or(RegistrationError::MissingField { field: "timeout_ms" })?;
        let max_retries = m
            .max_retries
            .ok_or(RegistrationError::MissingField { field: "max_retries" })?;

        let descriptor = CapabilityDescriptor {
            name,
            description,
            input_contract,
            safety_class,
            timeout_ms,
            max_retries,
        };
        descriptor.check_complete()?;
        Ok(descriptor)
    }
}
