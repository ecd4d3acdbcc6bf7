//! Plan approval state machine.

use tiller_domain::{EngineError, EngineResult, PlanState};
use tracing::debug;

/// Per-thread plan approval state.
///
/// Transient: reset on thread restart or session switch.
#[derive(Debug, Default)]
pub struct PlanMachine {
    state: PlanState,
    plan: Option<String>,
}

impl PlanMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> PlanState {
        self.state
    }

    /// The proposed plan text, while one is held.
    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    /// A plan-proposed event arrived from the stream.
    pub fn observe_proposed(&mut self, plan: impl Into<String>) {
        debug!("Plan proposed");
        self.state = PlanState::Proposed;
        self.plan = Some(plan.into());
    }

    /// Approve the proposed plan.
    ///
    /// Only valid in `Proposed`. Moves to `Approved`, retaining the
    /// plan text so it can still seed a new context.
    pub fn approve(&mut self) -> EngineResult<()> {
        if self.state != PlanState::Proposed {
            return Err(EngineError::InvalidState(format!(
                "cannot approve plan in state {:?}",
                self.state
            )));
        }
        self.state = PlanState::Approved;
        Ok(())
    }

    /// Reject the proposed plan.
    ///
    /// Only valid in `Proposed`. Drops the plan and returns to `None`,
    /// so a subsequent send proceeds normally.
    pub fn reject(&mut self) -> EngineResult<()> {
        if self.state != PlanState::Proposed {
            return Err(EngineError::InvalidState(format!(
                "cannot reject plan in state {:?}",
                self.state
            )));
        }
        self.state = PlanState::None;
        self.plan = None;
        Ok(())
    }

    /// Take the plan to seed a new context.
    ///
    /// Valid from `Proposed` (implicit approval) or `Approved`.
    /// Consumes the plan and resets to `None`.
    pub fn take_for_new_context(&mut self) -> EngineResult<String> {
        match self.state {
            PlanState::Proposed | PlanState::Approved => {
                let plan = self.plan.take().ok_or_else(|| {
                    EngineError::InvalidState("plan state held no plan text".to_string())
                })?;
                self.state = PlanState::None;
                Ok(plan)
            }
            other => Err(EngineError::InvalidState(format!(
                "cannot execute plan in new context from state {other:?}"
            ))),
        }
    }

    /// Reset to `None` (restart, session switch, or next turn after
    /// approval was acted on).
    pub fn reset(&mut self) {
        self.state = PlanState::None;
        self.plan = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_only_from_proposed() {
        let mut machine = PlanMachine::new();
        assert!(matches!(
            machine.approve(),
            Err(EngineError::InvalidState(_))
        ));
        assert_eq!(machine.state(), PlanState::None);

        machine.observe_proposed("1. do the thing");
        machine.approve().unwrap();
        assert_eq!(machine.state(), PlanState::Approved);

        // Approving twice is invalid.
        assert!(machine.approve().is_err());
    }

    #[test]
    fn reject_returns_to_none() {
        let mut machine = PlanMachine::new();
        machine.observe_proposed("plan");
        machine.reject().unwrap();

        assert_eq!(machine.state(), PlanState::None);
        assert!(machine.plan().is_none());
        assert!(machine.reject().is_err());
    }

    #[test]
    fn reject_from_none_causes_no_state_change() {
        let mut machine = PlanMachine::new();
        assert!(machine.reject().is_err());
        assert_eq!(machine.state(), PlanState::None);
    }

    #[test]
    fn take_for_new_context_from_proposed() {
        let mut machine = PlanMachine::new();
        machine.observe_proposed("the plan");

        let plan = machine.take_for_new_context().unwrap();
        assert_eq!(plan, "the plan");
        assert_eq!(machine.state(), PlanState::None);
    }

    #[test]
    fn take_for_new_context_after_approval() {
        let mut machine = PlanMachine::new();
        machine.observe_proposed("the plan");
        machine.approve().unwrap();

        let plan = machine.take_for_new_context().unwrap();
        assert_eq!(plan, "the plan");
        assert_eq!(machine.state(), PlanState::None);
    }

    #[test]
    fn take_for_new_context_invalid_from_none() {
        let mut machine = PlanMachine::new();
        assert!(machine.take_for_new_context().is_err());
    }

    #[test]
    fn reproposal_replaces_plan() {
        let mut machine = PlanMachine::new();
        machine.observe_proposed("v1");
        machine.observe_proposed("v2");
        assert_eq!(machine.plan(), Some("v2"));
        assert_eq!(machine.state(), PlanState::Proposed);
    }
}
