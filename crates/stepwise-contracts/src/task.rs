//! Task identity, status and the mutable run record.
//!
//! `TaskState` is the single record threading through one run. Its fields are
//! private: the engine advances it through a handful of narrow methods so the
//! history can only ever grow, and status changes happen in one place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::RunConfig,
    decision::ActionCall,
    step::{StepOrigin, StepRecord},
};

/// Unique identifier for a single task run.
///
/// Assigned by `TaskState::new` and never changed. It is the key under which
/// a paused run is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub uuid::Uuid);

impl TaskId {
    /// Create a new, unique task ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a task ID from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    /// Suspended at an interrupt point; resumable, not terminal.
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Is this a terminal status (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a run stopped.
///
/// `GoalSatisfied` is the only reason that maps to `TaskStatus::Completed`;
/// everything else ends `Failed`, but the reason keeps "ran out of budget"
/// apart from "crashed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    GoalSatisfied,
    BudgetExhausted,
    DeadlineExceeded,
    Cancelled,
    Fatal { message: String },
}

impl TerminationReason {
    /// The terminal status this reason produces.
    pub fn status(&self) -> TaskStatus {
        match self {
            TerminationReason::GoalSatisfied => TaskStatus::Completed,
            _ => TaskStatus::Failed,
        }
    }
}

/// The interrupt a paused run is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// The prompt shown to the human.
    pub question: String,
    /// The action that triggered the interrupt. Its result will be the
    /// human's feedback.
    pub action: ActionCall,
    /// Whether the planner or the remediator chose the action.
    pub origin: StepOrigin,
}

/// The single mutable record threading through one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    task_id: TaskId,
    goal: String,
    history: Vec<StepRecord>,
    iteration_count: u32,
    status: TaskStatus,
    termination: Option<TerminationReason>,
    pending: Option<PendingInterrupt>,
    answer: Option<String>,
    config: RunConfig,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskState {
    /// Start a new run for `goal`, snapshotting `config` for its whole life.
    pub fn new(goal: impl Into<String>, config: RunConfig) -> Self {
        let now = Utc::now();
        Self {
            task_id: TaskId::new(),
            goal: goal.into(),
            history: Vec::new(),
            iteration_count: 0,
            status: TaskStatus::Running,
            termination: None,
            pending: None,
            answer: None,
            config,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// The append-only step log.
    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        self.termination.as_ref()
    }

    /// Present only while the task is paused.
    pub fn pending_question(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.question.as_str())
    }

    pub fn pending(&self) -> Option<&PendingInterrupt> {
        self.pending.as_ref()
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True once `iteration_count` has reached the configured maximum.
    pub fn budget_exhausted(&self) -> bool {
        self.iteration_count >= self.config.max_iterations
    }

    /// Count one more Plan→Execute cycle and return the new count.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.touch();
        self.iteration_count
    }

    /// Append a completed step.
    ///
    /// The record's `index` is overwritten with its position in the history,
    /// so indices always run 0, 1, 2, … with no gaps.
    pub fn record_step(&mut self, mut record: StepRecord) -> &StepRecord {
        record.index = self.history.len() as u32;
        self.history.push(record);
        self.touch();
        &self.history[self.history.len() - 1]
    }

    /// Move to `Paused`, remembering the interrupt that caused it.
    pub fn suspend(&mut self, interrupt: PendingInterrupt) {
        self.status = TaskStatus::Paused;
        self.pending = Some(interrupt);
        self.touch();
    }

    /// Leave `Paused` and hand back the interrupt that was pending.
    ///
    /// Returns `None` and changes nothing when the task is not paused.
    pub fn take_interrupt(&mut self) -> Option<PendingInterrupt> {
        if self.status != TaskStatus::Paused {
            return None;
        }
        let pending = self.pending.take()?;
        self.status = TaskStatus::Running;
        self.touch();
        Some(pending)
    }

    /// Record the final answer from a terminal decision.
    pub fn set_answer(&mut self, answer: Option<String>) {
        self.answer = answer;
        self.touch();
    }

    /// Move to a terminal status for `reason`.
    pub fn finish(&mut self, reason: TerminationReason) {
        self.status = reason.status();
        self.termination = Some(reason);
        self.pending = None;
        self.touch();
    }

    /// Build the caller-facing summary of this run.
    pub fn to_final_result(&self) -> FinalResult {
        FinalResult {
            task_id: self.task_id.clone(),
            status: self.status,
            termination: self.termination.clone(),
            iteration_count: self.iteration_count,
            history: self.history.clone(),
            pending_question: self.pending_question().map(str::to_string),
            answer: self.answer.clone(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// What `launch` and `resume` hand back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub termination: Option<TerminationReason>,
    pub iteration_count: u32,
    pub history: Vec<StepRecord>,
    /// Set only when `status` is `Paused`.
    pub pending_question: Option<String>,
    pub answer: Option<String>,
}
