//! The stepwise engine: the state machine that drives one run.
//!
//!   Plan → Execute → Verify → [Remediate → Execute]* → Plan | Suspend | Finish
//!
//! Each node is a variant of `Node`; `advance` maps one node to the next.
//! The engine is the only code that appends steps, counts iterations or
//! changes a task's status. Before every node it checks the cancellation
//! token and the run deadline.
//!
//! Nothing that goes wrong inside a run escapes as an error: capability
//! failures become failed steps, reasoning failures end the run as `Failed`.
//! `EngineError` is reserved for the caller boundary (resume lookups and
//! storage).

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stepwise_contracts::{
    capability::CapabilityDescriptor,
    config::RunConfig,
    decision::{ActionCall, Decision},
    error::{EngineError, EngineResult, PlannerError, StoreError},
    step::{StepOrigin, StepRecord, StepResult},
    task::{FinalResult, PendingInterrupt, TaskId, TaskState, TaskStatus, TerminationReason},
};

use crate::{
    dispatcher::Dispatcher,
    planner::Planner,
    registry::CapabilityRegistry,
    remediator::Remediator,
    snapshot,
    termination::{self, Checkpoint, Verdict},
    traits::{ContractValidator, PolicyEngine, ReasoningBackend, TaskStore},
    verifier::StepVerifier,
};

#[derive(Debug)]
enum Node {
    Plan,
    Execute { call: ActionCall, origin: StepOrigin },
    /// A dispatched step awaiting judgement; not yet in the history.
    Verify(StepRecord),
    /// The step that was judged a failure, already in the history.
    Remediate(StepRecord),
    Suspend(PendingInterrupt),
    Finish(TerminationReason),
}

impl Node {
    fn name(&self) -> &'static str {
        match self {
            Node::Plan => "plan",
            Node::Execute { .. } => "execute",
            Node::Verify(_) => "verify",
            Node::Remediate(_) => "remediate",
            Node::Suspend(_) => "suspend",
            Node::Finish(_) => "finish",
        }
    }
}

/// Runs tasks against a shared registry, backend and store.
///
/// One `Engine` can drive many runs concurrently; each run owns its
/// `TaskState` and shares everything else read-only.
pub struct Engine {
    registry: Arc<CapabilityRegistry>,
    dispatcher: Dispatcher,
    planner: Planner,
    verifier: StepVerifier,
    remediator: Remediator,
    store: Arc<dyn TaskStore>,
}

impl Engine {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        backend: Arc<dyn ReasoningBackend>,
        policy: Arc<dyn PolicyEngine>,
        validator: Arc<dyn ContractValidator>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry), policy, Arc::clone(&validator)),
            planner: Planner::new(Arc::clone(&backend), Arc::clone(&validator)),
            verifier: StepVerifier::new(Arc::clone(&backend), Arc::clone(&validator)),
            remediator: Remediator::new(backend, validator),
            registry,
            store,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Start a new run and drive it until it finishes or pauses.
    pub async fn launch(
        &self,
        goal: impl Into<String>,
        config: RunConfig,
    ) -> EngineResult<FinalResult> {
        self.launch_with_cancel(goal, config, CancellationToken::new())
            .await
    }

    pub async fn launch_with_cancel(
        &self,
        goal: impl Into<String>,
        config: RunConfig,
        cancel: CancellationToken,
    ) -> EngineResult<FinalResult> {
        let state = TaskState::new(goal, config);
        info!(
            task_id = %state.task_id(),
            goal = %state.goal(),
            max_iterations = state.config().max_iterations,
            safe_mode = state.config().safe_mode,
            "task launched"
        );
        self.drive(state, &cancel).await
    }

    /// Continue a paused run, feeding `feedback` in as the answer to its
    /// pending question.
    pub async fn resume(
        &self,
        task_id: &TaskId,
        feedback: impl Into<String>,
    ) -> EngineResult<FinalResult> {
        self.resume_with_cancel(task_id, feedback, CancellationToken::new())
            .await
    }

    pub async fn resume_with_cancel(
        &self,
        task_id: &TaskId,
        feedback: impl Into<String>,
        cancel: CancellationToken,
    ) -> EngineResult<FinalResult> {
        // Claim the run. `take` removes the snapshot in the same step that
        // reads it, so a concurrent resume either gets NotFound or, if this
        // run pauses again first, the newer snapshot.
        let bytes = self.store.take(task_id).await.map_err(not_found)?;

        let mut state = match self.resumable(task_id, &bytes) {
            Ok(state) => state,
            Err(err) => {
                // Put back what we took so a bad snapshot stays inspectable.
                if let Err(restore) = self.store.save(task_id, &bytes).await {
                    warn!(task_id = %task_id, error = %restore, "rejected snapshot not restored");
                }
                return Err(err);
            }
        };

        let interrupt = state.take_interrupt().ok_or_else(|| EngineError::Snapshot {
            reason: format!("paused task '{task_id}' has no pending interrupt"),
        })?;
        state.begin_iteration();

        let now = Utc::now();
        let ActionCall { reasoning, capability_name, arguments } = interrupt.action;
        state.record_step(StepRecord {
            index: 0,
            origin: StepOrigin::Human,
            reasoning,
            capability_name,
            arguments,
            result: StepResult::Success { output: Value::String(feedback.into()) },
            attempts: 0,
            judgement: None,
            started_at: now,
            finished_at: now,
        });

        info!(
            task_id = %task_id,
            iteration = state.iteration_count(),
            "task resumed with human feedback"
        );
        self.drive(state, &cancel).await
    }

    /// Load a stored paused task without claiming it.
    pub async fn paused_task(&self, task_id: &TaskId) -> EngineResult<TaskState> {
        let bytes = self.store.load(task_id).await.map_err(not_found)?;
        decode_for(task_id, &bytes)
    }

    fn resumable(&self, task_id: &TaskId, bytes: &[u8]) -> EngineResult<TaskState> {
        let state = decode_for(task_id, bytes)?;
        if state.status() != TaskStatus::Paused {
            return Err(EngineError::InvalidState {
                task_id: task_id.to_string(),
                status: state.status(),
            });
        }
        if state.pending().is_none() {
            return Err(EngineError::Snapshot {
                reason: format!("paused task '{task_id}' has no pending interrupt"),
            });
        }
        Ok(state)
    }

    // ── State machine ────────────────────────────────────────────────────────

    async fn drive(
        &self,
        mut state: TaskState,
        cancel: &CancellationToken,
    ) -> EngineResult<FinalResult> {
        let capabilities = self.dispatcher.offered(state.task_id(), state.config());
        let deadline = Instant::now().checked_add(run_budget(state.config(), &capabilities));
        let mut node = Node::Plan;

        loop {
            if !matches!(node, Node::Finish(_)) {
                if cancel.is_cancelled() {
                    node = Node::Finish(TerminationReason::Cancelled);
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    node = Node::Finish(TerminationReason::DeadlineExceeded);
                }
            }

            debug!(
                task_id = %state.task_id(),
                iteration = state.iteration_count(),
                node = node.name(),
                "entering node"
            );

            node = match node {
                Node::Finish(reason) => {
                    state.finish(reason);
                    info!(
                        task_id = %state.task_id(),
                        status = %state.status(),
                        iterations = state.iteration_count(),
                        steps = state.history().len(),
                        "task finished"
                    );
                    return Ok(state.to_final_result());
                }
                Node::Suspend(interrupt) => {
                    state.suspend(interrupt);
                    let bytes = snapshot::encode(&state)?;
                    // The caller only sees Paused once the snapshot is durable.
                    self.store.save(state.task_id(), &bytes).await?;
                    info!(
                        task_id = %state.task_id(),
                        question = state.pending_question().unwrap_or_default(),
                        "task paused for human input"
                    );
                    return Ok(state.to_final_result());
                }
                other => self.advance(&mut state, other, &capabilities).await,
            };
        }
    }

    async fn advance(
        &self,
        state: &mut TaskState,
        node: Node,
        capabilities: &[CapabilityDescriptor],
    ) -> Node {
        match node {
            Node::Plan => {
                if let Verdict::End(reason) = termination::evaluate(state, Checkpoint::Progress) {
                    return Node::Finish(reason);
                }
                match self.planner.plan(state, capabilities).await {
                    Ok(decision) => {
                        let next = route(state, decision, StepOrigin::Planner);
                        self.gate(state, next)
                    }
                    Err(err) => fatal(state, &err),
                }
            }

            Node::Execute { call, origin } => {
                let iteration = state.begin_iteration();
                debug!(
                    task_id = %state.task_id(),
                    iteration,
                    capability = %call.capability_name,
                    "executing"
                );
                let outcome = self
                    .dispatcher
                    .dispatch(state.task_id(), &call, state.config())
                    .await;
                Node::Verify(StepRecord {
                    index: 0,
                    origin,
                    reasoning: call.reasoning,
                    capability_name: call.capability_name,
                    arguments: call.arguments,
                    result: outcome.result,
                    attempts: outcome.attempts,
                    judgement: None,
                    started_at: outcome.started_at,
                    finished_at: outcome.finished_at,
                })
            }

            Node::Verify(mut record) => {
                match self.verifier.verify(state, &record).await {
                    Ok(judgement) => record.judgement = judgement,
                    Err(err) => {
                        state.record_step(record);
                        return fatal(state, &err);
                    }
                }
                let judged_failure = record.judgement.as_ref().is_some_and(|j| !j.passed());
                let recorded = state.record_step(record).clone();

                match termination::evaluate(state, Checkpoint::Progress) {
                    Verdict::End(reason) => Node::Finish(reason),
                    _ if judged_failure => Node::Remediate(recorded),
                    _ => Node::Plan,
                }
            }

            Node::Remediate(failing) => {
                match self.remediator.remediate(state, &failing, capabilities).await {
                    Ok(decision) => {
                        let next = route(state, decision, StepOrigin::Remediator);
                        self.gate(state, next)
                    }
                    Err(err) => fatal(state, &err),
                }
            }

            terminal @ (Node::Suspend(_) | Node::Finish(_)) => terminal,
        }
    }

    /// Only pause for a call the dispatcher would accept. A rejected one is
    /// sent through Execute instead and recorded as a failed step.
    fn gate(&self, state: &TaskState, node: Node) -> Node {
        let interrupt = match node {
            Node::Suspend(interrupt) => interrupt,
            other => return other,
        };
        let admitted = self
            .dispatcher
            .admit(state.task_id(), &interrupt.action, state.config())
            .map(|_| ());
        match admitted {
            Ok(()) => Node::Suspend(interrupt),
            Err(err) => {
                debug!(
                    task_id = %state.task_id(),
                    capability = %interrupt.action.capability_name,
                    error = %err,
                    "interrupt call rejected, not pausing"
                );
                Node::Execute { call: interrupt.action, origin: interrupt.origin }
            }
        }
    }
}

/// Turn a fresh decision into the next node.
fn route(state: &mut TaskState, decision: Decision, origin: StepOrigin) -> Node {
    let verdict = termination::evaluate(state, Checkpoint::Decided(&decision));
    match (verdict, decision) {
        (Verdict::End(reason), Decision::Finish { answer, .. }) => {
            state.set_answer(answer);
            Node::Finish(reason)
        }
        (Verdict::End(reason), Decision::Act(_)) => Node::Finish(reason),
        (Verdict::Interrupt { question }, Decision::Act(action)) => {
            Node::Suspend(PendingInterrupt { question, action, origin })
        }
        (_, Decision::Act(call)) => Node::Execute { call, origin },
        (_, Decision::Finish { answer, .. }) => {
            state.set_answer(answer);
            Node::Finish(TerminationReason::GoalSatisfied)
        }
    }
}

fn fatal(state: &TaskState, err: &PlannerError) -> Node {
    let message = err.to_string();
    warn!(
        task_id = %state.task_id(),
        stage = %err.stage(),
        error = %message,
        "reasoning step failed, ending run"
    );
    match termination::evaluate(state, Checkpoint::Fatal(&message)) {
        Verdict::End(reason) => Node::Finish(reason),
        _ => Node::Finish(TerminationReason::Fatal { message }),
    }
}

fn not_found(err: StoreError) -> EngineError {
    match err {
        StoreError::NotFound { task_id } => EngineError::NotFound { task_id },
        other => EngineError::Store(other),
    }
}

fn decode_for(task_id: &TaskId, bytes: &[u8]) -> EngineResult<TaskState> {
    let state = snapshot::decode(bytes)?;
    if state.task_id() != task_id {
        return Err(EngineError::Snapshot {
            reason: format!(
                "snapshot stored under '{task_id}' belongs to task '{}'",
                state.task_id()
            ),
        });
    }
    Ok(state)
}

/// Upper bound on a run's wall-clock time.
///
/// Every cycle may spend one planner call (two with verification) plus the
/// slowest permitted capability's worst case; one extra cycle covers the
/// final `finish` decision. `run_timeout_ms`, when set, caps the result.
pub fn run_budget(config: &RunConfig, capabilities: &[CapabilityDescriptor]) -> Duration {
    let reasoning_calls = if config.verification { 2 } else { 1 };
    let slowest = capabilities
        .iter()
        .map(CapabilityDescriptor::worst_case)
        .max()
        .unwrap_or_default();
    let per_cycle = config
        .planner_timeout()
        .saturating_mul(reasoning_calls)
        .saturating_add(slowest);
    let derived = per_cycle.saturating_mul(config.max_iterations.saturating_add(1));

    match config.run_timeout() {
        Some(cap) => cap.min(derived),
        None => derived,
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
    use tokio_util::sync::CancellationToken;

    use stepwise_contracts::{
        backend::BackendPurpose,
        capability::{CapabilityDescriptor, SafetyClass},
        config::RunConfig,
        error::{CapabilityError, EngineError},
        policy::PolicyVerdict,
        step::{FailureKind, StepOrigin, StepResult},
        task::{TaskId, TaskStatus, TerminationReason},
    };

    use super::{run_budget, Engine};
    use crate::{
        registry::CapabilityRegistry,
        testing::{MemoryStore, MockBackend, MockPolicy, RequiredKeysValidator},
        traits::handler_fn,
    };

    // ── Fixtures ─────────────────────────────────────────────────────────────

    struct Fixture {
        backend: Arc<MockBackend>,
        store: Arc<MemoryStore>,
        echo_calls: Arc<AtomicU32>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                backend: Arc::new(MockBackend::new()),
                store: Arc::new(MemoryStore::default()),
                echo_calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn engine(&self, verdict: PolicyVerdict) -> Engine {
            self.engine_with_store(verdict, Arc::clone(&self.store))
        }

        fn engine_with_store(&self, verdict: PolicyVerdict, store: Arc<MemoryStore>) -> Engine {
            let counter = Arc::clone(&self.echo_calls);
            let echo = handler_fn(move |args: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CapabilityError>(args["text"].clone())
                }
            });
            let mut registry = CapabilityRegistry::new();
            registry
                .register(
                    CapabilityDescriptor::new(
                        "echo",
                        "Echo the text argument",
                        json!({ "type": "object", "required": ["text"] }),
                        SafetyClass::Safe,
                        Duration::from_secs(1),
                        0,
                    ),
                    Arc::new(echo),
                )
                .unwrap();
            registry
                .register(
                    CapabilityDescriptor::new(
                        "ask_human",
                        "Ask the operator",
                        json!({ "type": "object", "required": ["question"] }),
                        SafetyClass::Safe,
                        Duration::from_secs(1),
                        0,
                    ),
                    Arc::new(handler_fn(|_args: Value| async {
                        Err::<Value, _>(CapabilityError::fatal("no operator attached"))
                    })),
                )
                .unwrap();

            Engine::new(
                Arc::new(registry),
                self.backend.clone(),
                Arc::new(MockPolicy { verdict }),
                Arc::new(RequiredKeysValidator),
                store,
            )
        }

        fn plan_echo(&self, times: usize) {
            for _ in 0..times {
                self.backend.push(
                    BackendPurpose::Plan,
                    json!({
                        "type": "act",
                        "reasoning": "say hello",
                        "capability_name": "echo",
                        "arguments": { "text": "hello" }
                    }),
                );
            }
        }

        fn plan_act(&self, capability: &str, arguments: Value) {
            self.backend.push(
                BackendPurpose::Plan,
                json!({
                    "type": "act",
                    "reasoning": "try it",
                    "capability_name": capability,
                    "arguments": arguments
                }),
            );
        }

        fn plan_finish(&self, answer: &str) {
            self.backend.push(
                BackendPurpose::Plan,
                json!({ "type": "finish", "reasoning": "done", "answer": answer }),
            );
        }

        fn plan_ask(&self, question: &str) {
            self.backend.push(
                BackendPurpose::Plan,
                json!({
                    "type": "act",
                    "reasoning": "need approval",
                    "capability_name": "ask_human",
                    "arguments": { "question": question }
                }),
            );
        }
    }

    // ── Launch ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn act_then_finish_completes() {
        let fx = Fixture::new();
        fx.plan_echo(1);
        fx.plan_finish("said hello");

        let result = fx
            .engine(PolicyVerdict::Allow)
            .launch("say hello", RunConfig::default())
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.termination, Some(TerminationReason::GoalSatisfied));
        assert_eq!(result.iteration_count, 1);
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.history[0].result, StepResult::Success { output: json!("hello") });
        assert_eq!(result.answer.as_deref(), Some("said hello"));
        assert!(result.pending_question.is_none());
    }

    #[tokio::test]
    async fn iteration_budget_bounds_the_run() {
        let fx = Fixture::new();
        fx.plan_echo(10);

        let result = fx
            .engine(PolicyVerdict::Allow)
            .launch("loop forever", RunConfig::default().with_max_iterations(3))
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.termination, Some(TerminationReason::BudgetExhausted));
        assert_eq!(result.iteration_count, 3);
        assert_eq!(result.history.len(), 3);
        assert_eq!(fx.echo_calls.load(Ordering::SeqCst), 3);
        // No plan is requested once the budget is spent.
        assert_eq!(fx.backend.requests_for(BackendPurpose::Plan).len(), 3);
    }

    #[tokio::test]
    async fn history_indices_are_sequential() {
        let fx = Fixture::new();
        fx.plan_echo(4);
        fx.plan_finish("ok");

        let result = fx
            .engine(PolicyVerdict::Allow)
            .launch("goal", RunConfig::default())
            .await
            .unwrap();

        let indices: Vec<u32> = result.history.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn planner_failure_ends_run_as_fatal() {
        let fx = Fixture::new();

        let result = fx
            .engine(PolicyVerdict::Allow)
            .launch("goal", RunConfig::default())
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(matches!(result.termination, Some(TerminationReason::Fatal { .. })));
        assert!(result.history.is_empty());
    }

    #[tokio::test]
    async fn policy_denial_is_recorded_and_fed_back() {
        let fx = Fixture::new();
        fx.plan_echo(1);
        fx.plan_finish("gave up");

        let result = fx
            .engine(PolicyVerdict::Deny { reason: "read-only run".to_string() })
            .launch("goal", RunConfig::default())
            .await
            .unwrap();

        assert_eq!(fx.echo_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.status, TaskStatus::Completed);
        let failure = result.history[0].result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::PolicyDenied);
        assert_eq!(result.history[0].attempts, 0);

        // The second plan request saw the denied step.
        let plans = fx.backend.requests_for(BackendPurpose::Plan);
        assert_eq!(plans[1].history.len(), 1);
    }

    #[tokio::test]
    async fn failed_judgements_remediate_within_budget() {
        let fx = Fixture::new();
        fx.plan_echo(1);
        for _ in 0..5 {
            fx.backend.push(
                BackendPurpose::Verify,
                json!({ "verdict": "failure", "rationale": "not good enough" }),
            );
            fx.backend.push(
                BackendPurpose::Remediate,
                json!({
                    "type": "act",
                    "reasoning": "try again",
                    "capability_name": "echo",
                    "arguments": { "text": "again" }
                }),
            );
        }

        let config = RunConfig::default()
            .with_verification(true)
            .with_max_iterations(3);
        let result = fx.engine(PolicyVerdict::Allow).launch("goal", config).await.unwrap();

        assert_eq!(result.termination, Some(TerminationReason::BudgetExhausted));
        let origins: Vec<StepOrigin> = result.history.iter().map(|s| s.origin).collect();
        assert_eq!(
            origins,
            vec![StepOrigin::Planner, StepOrigin::Remediator, StepOrigin::Remediator]
        );
        assert!(result.history.iter().all(|s| s.judgement.is_some()));
        assert_eq!(fx.backend.requests_for(BackendPurpose::Remediate).len(), 2);
    }

    #[tokio::test]
    async fn verifier_failure_keeps_the_step_and_ends_fatal() {
        let fx = Fixture::new();
        fx.plan_echo(1);
        fx.backend.push_result(
            BackendPurpose::Verify,
            Err(stepwise_contracts::error::BackendError::Unreachable("down".to_string())),
        );

        let result = fx
            .engine(PolicyVerdict::Allow)
            .launch("goal", RunConfig::default().with_verification(true))
            .await
            .unwrap();

        assert!(matches!(result.termination, Some(TerminationReason::Fatal { .. })));
        assert_eq!(result.history.len(), 1);
        assert!(result.history[0].judgement.is_none());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_planning() {
        let fx = Fixture::new();
        fx.plan_echo(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fx
            .engine(PolicyVerdict::Allow)
            .launch_with_cancel("goal", RunConfig::default(), cancel)
            .await
            .unwrap();

        assert_eq!(result.termination, Some(TerminationReason::Cancelled));
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(fx.backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_run_timeout_exceeds_deadline_immediately() {
        let fx = Fixture::new();
        fx.plan_echo(1);
        let config = RunConfig { run_timeout_ms: Some(0), ..RunConfig::default() };

        let result = fx.engine(PolicyVerdict::Allow).launch("goal", config).await.unwrap();

        assert_eq!(result.termination, Some(TerminationReason::DeadlineExceeded));
        assert!(result.history.is_empty());
    }

    #[test]
    fn run_budget_uses_smaller_of_derived_and_cap() {
        let caps = vec![CapabilityDescriptor::new(
            "slow",
            "slow capability",
            json!({ "type": "object" }),
            SafetyClass::Safe,
            Duration::from_millis(100),
            1,
        )];
        let config = RunConfig {
            max_iterations: 2,
            planner_timeout_ms: 50,
            ..RunConfig::default()
        };
        // (50 + 100 * 2) * (2 + 1)
        assert_eq!(run_budget(&config, &caps), Duration::from_millis(750));

        let verified = config.clone().with_verification(true);
        assert_eq!(run_budget(&verified, &caps), Duration::from_millis(900));

        let capped = RunConfig { run_timeout_ms: Some(10), ..config };
        assert_eq!(run_budget(&capped, &caps), Duration::from_millis(10));
    }

    // ── Suspend / resume ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn interrupt_pauses_and_resume_injects_feedback() {
        let fx = Fixture::new();
        fx.plan_ask("May I proceed?");
        fx.plan_finish("approved and done");
        let config = RunConfig::default().with_interrupt("ask_human");

        let engine = fx.engine(PolicyVerdict::Allow);
        let paused = engine.launch("goal", config).await.unwrap();

        assert_eq!(paused.status, TaskStatus::Paused);
        assert_eq!(paused.pending_question.as_deref(), Some("May I proceed?"));
        assert!(paused.history.is_empty());
        assert!(paused.termination.is_none());
        assert_eq!(fx.store.entries.lock().unwrap().len(), 1);

        // A fresh engine over the same store picks the run up.
        let result = fx
            .engine(PolicyVerdict::Allow)
            .resume(&paused.task_id, "yes")
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.task_id, paused.task_id);
        assert_eq!(result.history.len(), 1);
        let human = &result.history[0];
        assert_eq!(human.origin, StepOrigin::Human);
        assert_eq!(human.capability_name, "ask_human");
        assert_eq!(human.attempts, 0);
        assert_eq!(human.result, StepResult::Success { output: json!("yes") });
        assert!(fx.store.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_unknown_task_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .engine(PolicyVerdict::Allow)
            .resume(&TaskId::new(), "yes")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn second_resume_of_same_task_fails() {
        let fx = Fixture::new();
        fx.plan_ask("ok?");
        fx.plan_finish("done");
        let engine = fx.engine(PolicyVerdict::Allow);
        let paused = engine
            .launch("goal", RunConfig::default().with_interrupt("ask_human"))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            engine.resume(&paused.task_id, "first"),
            engine.resume(&paused.task_id, "second"),
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn resume_racing_a_second_pause_keeps_both_replies() {
        let fx = Fixture::new();
        fx.plan_ask("first?");
        fx.plan_ask("second?");
        fx.plan_finish("done");
        let store = Arc::new(MemoryStore {
            take_delay: Duration::from_millis(20),
            ..MemoryStore::default()
        });
        let engine = fx.engine_with_store(PolicyVerdict::Allow, Arc::clone(&store));
        let paused = engine
            .launch("goal", RunConfig::default().with_interrupt("ask_human"))
            .await
            .unwrap();

        // A claims the first pause and pauses again before B's claim lands.
        let (a, b) = tokio::join!(engine.resume(&paused.task_id, "A"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            engine.resume(&paused.task_id, "B").await
        });

        let a = a.unwrap();
        assert_eq!(a.status, TaskStatus::Paused);
        assert_eq!(a.pending_question.as_deref(), Some("second?"));

        // B resumed A's second pause, so A's reply is part of its history.
        let b = b.unwrap();
        assert_eq!(b.status, TaskStatus::Completed);
        let replies: Vec<_> = b.history.iter().filter_map(|s| s.result.output().cloned()).collect();
        assert_eq!(replies, vec![json!("A"), json!("B")]);
        assert!(store.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn gated_capability_runs_once_the_human_replies() {
        let fx = Fixture::new();
        fx.plan_echo(1);
        fx.plan_echo(1);
        fx.plan_finish("echoed");
        let config = RunConfig::default().with_interrupt("echo");

        let paused = fx.engine(PolicyVerdict::Allow).launch("goal", config).await.unwrap();
        assert_eq!(paused.status, TaskStatus::Paused);
        assert_eq!(paused.pending_question.as_deref(), Some("say hello"));
        assert_eq!(fx.echo_calls.load(Ordering::SeqCst), 0);

        let result = fx
            .engine(PolicyVerdict::Allow)
            .resume(&paused.task_id, "go ahead")
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(fx.echo_calls.load(Ordering::SeqCst), 1);
        let origins: Vec<_> = result.history.iter().map(|s| s.origin).collect();
        assert_eq!(origins, vec![StepOrigin::Human, StepOrigin::Planner]);
        assert_eq!(result.history[1].result, StepResult::Success { output: json!("hello") });
        assert_eq!(result.iteration_count, 2);
    }

    #[tokio::test]
    async fn unknown_interrupt_capability_fails_instead_of_pausing() {
        let fx = Fixture::new();
        fx.plan_act("missing", json!({ "question": "?" }));
        fx.plan_finish("gave up");

        let result = fx
            .engine(PolicyVerdict::Allow)
            .launch("goal", RunConfig::default().with_interrupt("missing"))
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(
            result.history[0].result.failure().unwrap().kind,
            FailureKind::CapabilityNotFound
        );
        assert!(fx.store.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn denied_interrupt_capability_fails_instead_of_pausing() {
        let fx = Fixture::new();
        fx.plan_echo(1);
        fx.plan_finish("gave up");
        let deny = PolicyVerdict::Deny { reason: "safe mode".to_string() };

        let result = fx
            .engine(deny)
            .launch("goal", RunConfig::default().with_interrupt("echo"))
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.history[0].result.failure().unwrap().kind, FailureKind::PolicyDenied);
        assert_eq!(fx.echo_calls.load(Ordering::SeqCst), 0);
        assert!(fx.store.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_interrupt_arguments_fail_instead_of_pausing() {
        let fx = Fixture::new();
        fx.plan_act("ask_human", json!({ "prompt": "no question key" }));
        fx.plan_finish("gave up");

        let result = fx
            .engine(PolicyVerdict::Allow)
            .launch("goal", RunConfig::default().with_interrupt("ask_human"))
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(
            result.history[0].result.failure().unwrap().kind,
            FailureKind::ArgumentValidation
        );
    }

    #[tokio::test]
    async fn planner_is_not_offered_denied_capabilities() {
        let fx = Fixture::new();
        fx.plan_finish("nothing to do");
        let deny = PolicyVerdict::Deny { reason: "locked down".to_string() };

        fx.engine(deny).launch("goal", RunConfig::default()).await.unwrap();

        let request = &fx.backend.requests_for(BackendPurpose::Plan)[0];
        assert!(request.capabilities.is_empty());
    }

    #[tokio::test]
    async fn failed_save_is_an_error_not_a_pause() {
        let fx = Fixture::new();
        fx.plan_ask("ok?");
        let store = Arc::new(MemoryStore { fail_saves: true, ..MemoryStore::default() });

        let err = fx
            .engine_with_store(PolicyVerdict::Allow, store)
            .launch("goal", RunConfig::default().with_interrupt("ask_human"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Store(_)));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_rejected_and_left_in_place() {
        let fx = Fixture::new();
        let task_id = TaskId::new();
        fx.store
            .entries
            .lock()
            .unwrap()
            .insert(task_id.clone(), b"{ truncated".to_vec());

        let err = fx
            .engine(PolicyVerdict::Allow)
            .resume(&task_id, "yes")
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Snapshot { .. }));
        assert!(fx.store.entries.lock().unwrap().contains_key(&task_id));
    }
}
