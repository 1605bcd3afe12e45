//! Termination policy: continue, stop, or pause for a human.
//!
//! A pure function of the task state and the point the engine has reached.
//! It never mutates state and never performs I/O.

use stepwise_contracts::{
    decision::{ActionCall, Decision},
    step::StepOrigin,
    task::{TaskState, TerminationReason},
};

/// Where in the cycle the engine asks.
#[derive(Debug, Clone, Copy)]
pub enum Checkpoint<'a> {
    /// The planner or remediator just produced a decision.
    Decided(&'a Decision),
    /// A step was just recorded, or a new plan is about to be requested.
    Progress,
    /// A reasoning step failed irrecoverably.
    Fatal(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Interrupt { question: String },
    End(TerminationReason),
}

/// True when the latest step is the human's reply to this exact call.
///
/// Proposing the same call again straight after the reply goes ahead
/// instead of pausing a second time.
fn answered(state: &TaskState, call: &ActionCall) -> bool {
    state.history().last().is_some_and(|step| {
        step.origin == StepOrigin::Human
            && step.capability_name == call.capability_name
            && step.arguments == call.arguments
    })
}

pub fn evaluate(state: &TaskState, checkpoint: Checkpoint<'_>) -> Verdict {
    match checkpoint {
        Checkpoint::Fatal(message) => Verdict::End(TerminationReason::Fatal {
            message: message.to_string(),
        }),
        Checkpoint::Decided(Decision::Finish { .. }) => Verdict::End(TerminationReason::GoalSatisfied),
        Checkpoint::Decided(Decision::Act(call)) => {
            if state.budget_exhausted() {
                Verdict::End(TerminationReason::BudgetExhausted)
            } else if state.config().is_interrupt(&call.capability_name) && !answered(state, call) {
                // Prefer an explicit question argument; fall back to the
                // reasoning so the human always sees something.
                let question = ["question", "prompt"]
                    .iter()
                    .find_map(|key| call.arguments.get(*key).and_then(|v| v.as_str()))
                    .unwrap_or(&call.reasoning)
                    .to_string();
                Verdict::Interrupt { question }
            } else {
                Verdict::Continue
            }
        }
        Checkpoint::Progress => {
            if state.budget_exhausted() {
                Verdict::End(TerminationReason::BudgetExhausted)
            } else {
                Verdict::Continue
            }
        }
    }
}
