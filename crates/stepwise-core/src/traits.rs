//! Trait seams of the stepwise engine.
//!
//! - `ReasoningBackend` : untrusted decision maker (usually an LLM service)
//! - `CapabilityHandler`: untrusted action implementation
//! - `PolicyEngine`     : trusted gate, consulted before any handler runs
//! - `ContractValidator`: trusted checker for arguments and backend output
//! - `TaskStore`        : durable keyed storage for paused runs
//!
//! The engine only ever talks to these traits, so each can be swapped
//! without touching the state machine.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use stepwise_contracts::{
    backend::BackendRequest,
    error::{BackendError, CapabilityError, StoreResult},
    policy::{PolicyContext, PolicyVerdict},
    task::TaskId,
};

/// A reasoning service that answers structured requests.
///
/// Implementations receive the full request, including the JSON Schema the
/// answer must satisfy, and return the answer as JSON. The engine validates
/// the answer itself; implementations need not.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn complete(&self, request: &BackendRequest) -> Result<Value, BackendError>;
}

/// The implementation behind one registered capability.
///
/// Handlers are only invoked after the policy engine allowed the call and
/// the arguments passed validation against the descriptor's input contract.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn invoke(&self, arguments: Value) -> Result<Value, CapabilityError>;
}

/// The policy gate the dispatcher consults before every invocation.
///
/// Implementations must be deterministic and cheap. A `Deny` verdict means
/// the handler is never called.
pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, ctx: &PolicyContext) -> PolicyVerdict;
}

/// Structural validation of a JSON value against a JSON Schema document.
pub trait ContractValidator: Send + Sync {
    /// Return `Ok(())` if `instance` satisfies `contract`, or every violation
    /// found as a human-readable message.
    fn validate(&self, contract: &Value, instance: &Value) -> Result<(), Vec<String>>;
}

/// Durable keyed storage for serialized paused tasks.
///
/// `save` must not return until a subsequent `load` would observe the data.
/// `take` reads and removes an entry in one atomic step; the engine claims a
/// paused task with it, so of several concurrent resumes at most one
/// receives any given snapshot.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task_id: &TaskId, snapshot: &[u8]) -> StoreResult<()>;

    /// Fails with `StoreError::NotFound` when nothing is stored under the id.
    async fn load(&self, task_id: &TaskId) -> StoreResult<Vec<u8>>;

    /// Remove and return the snapshot. Fails with `StoreError::NotFound`
    /// when nothing is stored, including when a concurrent caller took it.
    async fn take(&self, task_id: &TaskId) -> StoreResult<Vec<u8>>;

    /// Reports whether an entry was actually removed.
    async fn delete(&self, task_id: &TaskId) -> StoreResult<bool>;
}

/// A `CapabilityHandler` backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a capability handler.
///
/// ```rust,ignore
/// let echo = handler_fn(|args| async move { Ok(args) });
/// registry.register(descriptor, Arc::new(echo))?;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CapabilityError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CapabilityError>> + Send + 'static,
{
    async fn invoke(&self, arguments: Value) -> Result<Value, CapabilityError> {
        (self.f)(arguments).await
    }
}
