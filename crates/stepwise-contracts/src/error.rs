//! Error types for the stepwise task engine.
//!
//! Errors are split by where they surface:
//!
//! - `RegistrationError` at startup, while the registry is built.
//! - `DispatchError` and `CapabilityError` inside a run. These are never
//!   fatal: the dispatcher turns them into a failed `StepRecord` so the
//!   planner can react.
//! - `BackendError` and `PlannerError` when the reasoning backend fails.
//!   A `PlannerError` ends the run as `Failed`.
//! - `StoreError` and `EngineError` at the caller boundary.
//! - `ConfigError` while loading presets.

use thiserror::Error;

use crate::{
    backend::BackendPurpose,
    step::{CapabilityFailure, FailureKind},
    task::TaskStatus,
};

/// Why a capability could not be added to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("capability descriptor is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("capability '{name}' has unknown safety class '{value}'")]
    UnknownSafetyClass { name: String, value: String },

    #[error("capability '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("capability '{name}' has an invalid descriptor: {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

/// An error raised by a capability handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CapabilityError {
    pub message: String,
    pub retriable: bool,
}

impl CapabilityError {
    /// An error that will recur if the same call is repeated.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), retriable: false }
    }

    /// A transient error; the planner may try the same call again.
    pub fn retriable(message: impl Into<String>) -> Self {
        Self { message: message.into(), retriable: true }
    }
}

/// Why a dispatch produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("capability '{name}' is not registered")]
    CapabilityNotFound { name: String },

    #[error("policy denied capability '{name}': {reason}")]
    PolicyDenied { name: String, reason: String },

    #[error("arguments for capability '{name}' failed validation: {details}")]
    ArgumentValidation { name: String, details: String },

    #[error("capability '{name}' timed out after {timeout_ms} ms ({attempts} attempt(s))")]
    Timeout { name: String, timeout_ms: u64, attempts: u32 },

    #[error("capability '{name}' failed: {message}")]
    Handler { name: String, message: String, retriable: bool },
}

impl DispatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::CapabilityNotFound { .. } => FailureKind::CapabilityNotFound,
            DispatchError::PolicyDenied { .. } => FailureKind::PolicyDenied,
            DispatchError::ArgumentValidation { .. } => FailureKind::ArgumentValidation,
            DispatchError::Timeout { .. } => FailureKind::Timeout,
            DispatchError::Handler { .. } => FailureKind::Handler,
        }
    }

    /// Rejections are deterministic; timeouts are transient; handler errors
    /// say for themselves.
    pub fn is_retriable(&self) -> bool {
        match self {
            DispatchError::CapabilityNotFound { .. }
            | DispatchError::PolicyDenied { .. }
            | DispatchError::ArgumentValidation { .. } => false,
            DispatchError::Timeout { .. } => true,
            DispatchError::Handler { retriable, .. } => *retriable,
        }
    }

    /// Normalize into the structured failure stored in a `StepRecord`.
    pub fn to_failure(&self) -> CapabilityFailure {
        CapabilityFailure {
            kind: self.kind(),
            message: self.to_string(),
            retriable: self.is_retriable(),
        }
    }
}

/// A failure reported by a reasoning backend implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("reasoning backend unreachable: {0}")]
    Unreachable(String),

    #[error("reasoning backend rejected the request: {0}")]
    Rejected(String),

    #[error("reasoning backend has no answer: {0}")]
    Exhausted(String),
}

/// A fatal failure of a reasoning step. Ends the run as `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("reasoning backend failed during {stage}: {source}")]
    Backend {
        stage: BackendPurpose,
        #[source]
        source: BackendError,
    },

    #[error("reasoning backend timed out during {stage} after {timeout_ms} ms")]
    Timeout { stage: BackendPurpose, timeout_ms: u64 },

    #[error("{stage} output could not be repaired: {reason}")]
    Unrepairable { stage: BackendPurpose, reason: String },
}

impl PlannerError {
    pub fn stage(&self) -> BackendPurpose {
        match self {
            PlannerError::Backend { stage, .. }
            | PlannerError::Timeout { stage, .. }
            | PlannerError::Unrepairable { stage, .. } => *stage,
        }
    }
}

/// Failures of a `TaskStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no stored task with id '{task_id}'")]
    NotFound { task_id: String },

    #[error("task store I/O failed: {reason}")]
    Io { reason: String },

    #[error("stored task is corrupt: {reason}")]
    Corrupt { reason: String },
}

/// Errors returned to callers of `launch` and `resume`.
///
/// Everything that happens inside a run (capability failures, planner
/// failures, budget exhaustion) is reported through `FinalResult` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("no paused task with id '{task_id}'")]
    NotFound { task_id: String },

    #[error("task '{task_id}' is {status}, not paused")]
    InvalidState { task_id: String, status: TaskStatus },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task snapshot could not be encoded or decoded: {reason}")]
    Snapshot { reason: String },
}

/// A preset or manifest file could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },

    #[error("unknown preset '{name}'")]
    UnknownPreset { name: String },
}

pub type RegistrationResult<T> = Result<T, RegistrationError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type EngineResult<T> = Result<T, EngineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
