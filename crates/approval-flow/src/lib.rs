//! Plan approval and clarification-question protocol.
//!
//! Two small orthogonal state machines, owned per thread by the
//! orchestrator:
//!
//! - [`PlanMachine`]: `None → Proposed → {Approved, None}`. Approval
//!   resumes the subprocess in execute mode and retains the plan text
//!   so it can seed a new context; rejection resumes in discard mode
//!   and returns straight to `None`. Taking the plan for a new context
//!   is valid from `Proposed` or `Approved` (taking it from `Proposed`
//!   counts as implicit approval).
//! - [`QuestionMachine`]: `no-question ⇄ awaiting-answer`. An answer
//!   must cover every required key or nothing changes.
//!
//! Both machines reject invalid transitions with
//! [`EngineError`](tiller_domain::EngineError) and cause no state
//! change on failure. Both reset when the thread restarts.

mod plan;
mod question;

pub use plan::PlanMachine;
pub use question::QuestionMachine;

/// Combined per-thread protocol state.
#[derive(Debug, Default)]
pub struct ApprovalFlow {
    pub plan: PlanMachine,
    pub question: QuestionMachine,
}

impl ApprovalFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset both machines (thread restart or new session).
    pub fn reset(&mut self) {
        self.plan.reset();
        self.question.clear();
    }
}
