//! Workflow state owned by one orchestrator.

use serde::{Deserialize, Serialize};

use crate::decision::DecisionKind;
use crate::sandbox::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Initial,
    Collaborating,
    Assembling,
    Executing,
    Reviewing,
    Correcting,
    Regenerating,
    Terminated,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Initial => "initial",
            WorkflowPhase::Collaborating => "collaborating",
            WorkflowPhase::Assembling => "assembling",
            WorkflowPhase::Executing => "executing",
            WorkflowPhase::Reviewing => "reviewing",
            WorkflowPhase::Correcting => "correcting",
            WorkflowPhase::Regenerating => "regenerating",
            WorkflowPhase::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a workflow stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    #[serde(rename = "TERMINATE_SUCCESS")]
    Success,
    #[serde(rename = "TERMINATE_FAILURE")]
    Failure,
    #[serde(rename = "TERMINATE_MAX_ITERATIONS")]
    MaxIterations,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Success => "TERMINATE_SUCCESS",
            TerminationReason::Failure => "TERMINATE_FAILURE",
            TerminationReason::MaxIterations => "TERMINATE_MAX_ITERATIONS",
        }
    }

    /// Reason recorded when the loop stops on `kind`.
    pub fn from_decision(kind: DecisionKind) -> Self {
        match kind {
            DecisionKind::TerminateFailure => TerminationReason::Failure,
            _ => TerminationReason::Success,
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the loop stops after acting on `kind`.
///
/// Terminal kinds always stop. Otherwise a successful execution stops the
/// loop unless the decision explicitly asked for more work.
pub fn should_terminate(kind: DecisionKind, latest: Option<&ExecutionResult>) -> bool {
    if kind.is_terminal() {
        return true;
    }
    latest.is_some_and(|e| e.success) && !kind.requests_work()
}

/// Overall success of a finished workflow.
pub fn final_success(reason: TerminationReason, latest: Option<&ExecutionResult>) -> bool {
    match reason {
        TerminationReason::Success => true,
        TerminationReason::Failure => false,
        TerminationReason::MaxIterations => latest.is_some_and(|e| e.success),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Rounds completed so far.
    pub iteration: u32,
    pub max_iterations: u32,
    pub phase: WorkflowPhase,
    pub termination_reason: Option<TerminationReason>,
    pub last_execution: Option<ExecutionResult>,
    /// Failed executions in a row, ending with the latest one.
    pub consecutive_failures: u32,
}

impl WorkflowState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            phase: WorkflowPhase::Initial,
            termination_reason: None,
            last_execution: None,
            consecutive_failures: 0,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == WorkflowPhase::Terminated
    }

    /// Record the execution that closed a round.
    pub fn record_execution(&mut self, execution: ExecutionResult) {
        if execution.success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        self.last_execution = Some(execution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> ExecutionResult {
        let mut r = ExecutionResult::fault("");
        r.success = true;
        r.error = None;
        r
    }

    #[test]
    fn test_should_terminate() {
        assert!(should_terminate(DecisionKind::TerminateFailure, None));
        assert!(should_terminate(DecisionKind::TerminateSuccess, Some(&ExecutionResult::fault("x"))));
        assert!(!should_terminate(DecisionKind::NeedCorrection, Some(&ok())));
        assert!(!should_terminate(DecisionKind::UpdateSolver, Some(&ok())));
    }

    #[test]
    fn test_final_success_at_ceiling_follows_last_execution() {
        assert!(final_success(TerminationReason::MaxIterations, Some(&ok())));
        assert!(!final_success(TerminationReason::MaxIterations, Some(&ExecutionResult::fault("x"))));
        assert!(!final_success(TerminationReason::MaxIterations, None));
        assert!(final_success(TerminationReason::Success, None));
        assert!(!final_success(TerminationReason::Failure, Some(&ok())));
    }

    #[test]
    fn test_failure_streak() {
        let mut state = WorkflowState::new(5);
        state.record_execution(ExecutionResult::fault("a"));
        state.record_execution(ExecutionResult::fault("b"));
        assert_eq!(state.consecutive_failures, 2);
        state.record_execution(ok());
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_execution.unwrap().success);
    }

    #[test]
    fn test_reason_wire_names() {
        let json = serde_json::to_string(&TerminationReason::MaxIterations).unwrap();
        assert_eq!(json, "\"TERMINATE_MAX_ITERATIONS\"");
        assert_eq!(
            TerminationReason::from_decision(DecisionKind::TerminateFailure),
            TerminationReason::Failure
        );
    }
}
