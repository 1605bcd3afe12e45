//! Errors raised while setting up or checking a reference scenario.

use thiserror::Error;

use stepwise_contracts::error::{ConfigError, EngineError, RegistrationError, StoreError};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("scenario I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The run finished, but not the way the scenario expects.
    #[error("scenario '{scenario}' ended unexpectedly: {reason}")]
    Unexpected { scenario: &'static str, reason: String },
}

impl ScenarioError {
    pub fn unexpected(scenario: &'static str, reason: impl Into<String>) -> Self {
        Self::Unexpected { scenario, reason: reason.into() }
    }
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;
