//! The Execute step: resolve, gate, validate, invoke, normalize.
//!
//! Order per call:
//!
//!   Resolve → Policy → Validate → Invoke (timeout, retries) → Normalize
//!
//! A handler is never invoked unless policy returned `Allow` and the
//! arguments satisfied the input contract. The dispatcher does not touch
//! `TaskState`; it returns a `DispatchOutcome` and the engine decides what to
//! record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use stepwise_contracts::{
    capability::CapabilityDescriptor,
    config::RunConfig,
    decision::ActionCall,
    error::DispatchError,
    policy::{PolicyContext, PolicyVerdict},
    step::StepResult,
    task::TaskId,
};

use crate::{
    registry::CapabilityRegistry,
    traits::{CapabilityHandler, ContractValidator, PolicyEngine},
};

/// What one dispatch produced.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub result: StepResult,
    /// Handler invocations performed (0 if rejected before invocation).
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Validates and invokes capability calls on behalf of the engine.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    policy: Arc<dyn PolicyEngine>,
    validator: Arc<dyn ContractValidator>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        policy: Arc<dyn PolicyEngine>,
        validator: Arc<dyn ContractValidator>,
    ) -> Self {
        Self { registry, policy, validator }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Run one capability call under the run's configuration.
    ///
    /// Never fails: every error is normalized into `StepResult::Failure` so
    /// it can be fed back to the planner.
    pub async fn dispatch(
        &self,
        task_id: &TaskId,
        call: &ActionCall,
        config: &RunConfig,
    ) -> DispatchOutcome {
        let started_at = Utc::now();
        let mut attempts = 0;

        let result = match self.run(task_id, call, config, &mut attempts).await {
            Ok(output) => {
                info!(
                    task_id = %task_id,
                    capability = %call.capability_name,
                    attempts,
                    "capability succeeded"
                );
                StepResult::Success { output }
            }
            Err(err) => {
                warn!(
                    task_id = %task_id,
                    capability = %call.capability_name,
                    attempts,
                    error = %err,
                    "capability call failed"
                );
                StepResult::Failure(err.to_failure())
            }
        };

        DispatchOutcome {
            result,
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Descriptors the planner may be offered: permitted by the run's
    /// filter and not refused outright by the policy gate.
    pub fn offered(&self, task_id: &TaskId, config: &RunConfig) -> Vec<CapabilityDescriptor> {
        self.registry
            .list_permitted(config)
            .into_iter()
            .filter(|descriptor| {
                let ctx = policy_context(task_id, descriptor, config);
                matches!(self.policy.evaluate(&ctx), PolicyVerdict::Allow)
            })
            .collect()
    }

    /// Resolve, policy gate and argument contract, without invoking.
    pub fn admit(
        &self,
        task_id: &TaskId,
        call: &ActionCall,
        config: &RunConfig,
    ) -> Result<(&CapabilityDescriptor, Arc<dyn CapabilityHandler>), DispatchError> {
        let name = call.capability_name.as_str();

        // ── Resolve ──────────────────────────────────────────────────────────
        let (descriptor, handler) = self.registry.resolve(name)?;

        // ── Policy gate ──────────────────────────────────────────────────────
        let ctx = policy_context(task_id, descriptor, config);
        if let PolicyVerdict::Deny { reason } = self.policy.evaluate(&ctx) {
            return Err(DispatchError::PolicyDenied {
                name: name.to_string(),
                reason,
            });
        }

        // ── Argument validation ──────────────────────────────────────────────
        if let Err(violations) = self
            .validator
            .validate(&descriptor.input_contract, &call.arguments)
        {
            return Err(DispatchError::ArgumentValidation {
                name: name.to_string(),
                details: violations.join("; "),
            });
        }

        Ok((descriptor, handler))
    }

    async fn run(
        &self,
        task_id: &TaskId,
        call: &ActionCall,
        config: &RunConfig,
        attempts: &mut u32,
    ) -> Result<Value, DispatchError> {
        let name = call.capability_name.as_str();
        let (descriptor, handler) = self.admit(task_id, call, config)?;

        // ── Invocation ───────────────────────────────────────────────────────
        //
        // Each attempt runs on its own task so a timed-out handler can be
        // aborted and a panicking one cannot take the engine down with it.
        let limit = descriptor.timeout();
        loop {
            *attempts += 1;
            debug!(
                task_id = %task_id,
                capability = %name,
                attempt = *attempts,
                "invoking capability"
            );

            let handler = Arc::clone(&handler);
            let arguments = call.arguments.clone();
            let mut invocation = tokio::spawn(async move { handler.invoke(arguments).await });

            match timeout(limit, &mut invocation).await {
                Ok(Ok(Ok(output))) => return Ok(output),
                Ok(Ok(Err(err))) => {
                    return Err(DispatchError::Handler {
                        name: name.to_string(),
                        message: err.message,
                        retriable: err.retriable,
                    })
                }
                Ok(Err(join_err)) => {
                    return Err(DispatchError::Handler {
                        name: name.to_string(),
                        message: format!("handler aborted: {join_err}"),
                        retriable: false,
                    })
                }
                Err(_) => {
                    invocation.abort();
                    if *attempts > descriptor.max_retries {
                        return Err(DispatchError::Timeout {
                            name: name.to_string(),
                            timeout_ms: descriptor.timeout_ms,
                            attempts: *attempts,
                        });
                    }
                    warn!(
                        task_id = %task_id,
                        capability = %name,
                        attempt = *attempts,
                        max_retries = descriptor.max_retries,
                        "capability timed out, retrying"
                    );
                }
            }
        }
    }
}

fn policy_context(
    task_id: &TaskId,
    descriptor: &CapabilityDescriptor,
    config: &RunConfig,
) -> PolicyContext {
    PolicyContext {
        task_id: task_id.to_string(),
        capability: descriptor.name.clone(),
        safety_class: descriptor.safety_class,
        safe_mode: config.safe_mode,
        filter: config.capabilities.clone(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    use serde_json::{json, Value};

    use stepwise_contracts::{
        capability::{CapabilityDescriptor, SafetyClass},
        config::RunConfig,
        decision::ActionCall,
        error::CapabilityError,
        policy::PolicyVerdict,
        step::{FailureKind, StepResult},
        task::TaskId,
    };

    use super::Dispatcher;
    use crate::{
        registry::CapabilityRegistry,
        testing::{MockPolicy, RequiredKeysValidator},
        traits::handler_fn,
    };

    fn descriptor(name: &str, timeout_ms: u64, max_retries: u32) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            name,
            "test capability",
            json!({ "type": "object", "required": ["text"] }),
            SafetyClass::Safe,
            Duration::from_millis(timeout_ms),
            max_retries,
        )
    }

    /// Registry with one counting handler that sleeps `delay_ms` then echoes.
    fn counting_registry(
        name: &str,
        timeout_ms: u64,
        max_retries: u32,
        delay_ms: u64,
    ) -> (Arc<CapabilityRegistry>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let handler = handler_fn(move |args: Value| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok::<_, CapabilityError>(args["text"].clone())
            }
        });
        let mut registry = CapabilityRegistry::new();
        registry
            .register(descriptor(name, timeout_ms, max_retries), Arc::new(handler))
            .unwrap();
        (Arc::new(registry), calls)
    }

    fn dispatcher(registry: Arc<CapabilityRegistry>, verdict: PolicyVerdict) -> Dispatcher {
        Dispatcher::new(
            registry,
            Arc::new(MockPolicy { verdict }),
            Arc::new(RequiredKeysValidator),
        )
    }

    fn call(name: &str, arguments: Value) -> ActionCall {
        ActionCall {
            reasoning: "test".to_string(),
            capability_name: name.to_string(),
            arguments,
        }
    }

    #[tokio::test]
    async fn successful_call_returns_output() {
        let (registry, calls) = counting_registry("echo", 1_000, 0, 0);
        let d = dispatcher(registry, PolicyVerdict::Allow);

        let outcome = d
            .dispatch(&TaskId::new(), &call("echo", json!({ "text": "hi" })), &RunConfig::default())
            .await;

        assert_eq!(outcome.result, StepResult::Success { output: json!("hi") });
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_capability_is_not_found() {
        let (registry, _) = counting_registry("echo", 1_000, 0, 0);
        let d = dispatcher(registry, PolicyVerdict::Allow);

        let outcome = d
            .dispatch(&TaskId::new(), &call("nope", json!({})), &RunConfig::default())
            .await;

        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::CapabilityNotFound);
        assert_eq!(outcome.attempts, 0);
    }

    /// A policy Deny must prevent the handler from being called.
    #[tokio::test]
    async fn policy_deny_never_invokes_handler() {
        let (registry, calls) = counting_registry("echo", 1_000, 0, 0);
        let d = dispatcher(
            registry,
            PolicyVerdict::Deny { reason: "not allowed".to_string() },
        );

        let outcome = d
            .dispatch(&TaskId::new(), &call("echo", json!({ "text": "hi" })), &RunConfig::default())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0, "handler must not run on Deny");
        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::PolicyDenied);
        assert!(failure.message.contains("not allowed"));
    }

    #[tokio::test]
    async fn invalid_arguments_never_invoke_handler() {
        let (registry, calls) = counting_registry("echo", 1_000, 0, 0);
        let d = dispatcher(registry, PolicyVerdict::Allow);

        let outcome = d
            .dispatch(&TaskId::new(), &call("echo", json!({ "txt": "typo" })), &RunConfig::default())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::ArgumentValidation);
        assert!(failure.message.contains("text"));
    }

    #[tokio::test]
    async fn timeout_without_retries_is_single_attempt() {
        let (registry, calls) = counting_registry("slow", 20, 0, 500);
        let d = dispatcher(registry, PolicyVerdict::Allow);

        let outcome = d
            .dispatch(&TaskId::new(), &call("slow", json!({ "text": "x" })), &RunConfig::default())
            .await;

        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_retried_up_to_max_retries() {
        let (registry, calls) = counting_registry("slow", 20, 2, 500);
        let d = dispatcher(registry, PolicyVerdict::Allow);

        let outcome = d
            .dispatch(&TaskId::new(), &call("slow", json!({ "text": "x" })), &RunConfig::default())
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.retriable);
    }

    #[tokio::test]
    async fn handler_error_is_normalized() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register(
                descriptor("flaky", 1_000, 3),
                Arc::new(handler_fn(|_| async {
                    Err::<Value, _>(CapabilityError::retriable("upstream busy"))
                })),
            )
            .unwrap();
        let d = dispatcher(Arc::new(registry), PolicyVerdict::Allow);

        let outcome = d
            .dispatch(&TaskId::new(), &call("flaky", json!({ "text": "x" })), &RunConfig::default())
            .await;

        // Handler errors are not retried by the dispatcher; only timeouts are.
        assert_eq!(outcome.attempts, 1);
        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Handler);
        assert!(failure.retriable);
        assert!(failure.message.contains("upstream busy"));
    }

    #[tokio::test]
    async fn panicking_handler_becomes_failure() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register(
                descriptor("boom", 1_000, 0),
                Arc::new(handler_fn(|_| async {
                    if true {
                        panic!("handler bug");
                    }
                    Ok::<Value, CapabilityError>(Value::Null)
                })),
            )
            .unwrap();
        let d = dispatcher(Arc::new(registry), PolicyVerdict::Allow);

        let outcome = d
            .dispatch(&TaskId::new(), &call("boom", json!({ "text": "x" })), &RunConfig::default())
            .await;

        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Handler);
        assert!(!failure.retriable);
    }
}
