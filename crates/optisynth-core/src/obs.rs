//! Workflow lifecycle events.
//!
//! Every event carries an `event` field (`round.started`,
//! `program.assembled`, `execution.finished`, `decision.made`,
//! `workflow.finished`, `round.fault`) so log pipelines can filter on it.

use tracing::{info, warn};

/// Span tagging everything logged for one session. Attach it to futures
/// with `tracing::Instrument`.
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("optisynth.session", session_id = %session_id)
}

/// RAII guard entering [`session_span`] for synchronous code.
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        Self {
            _span: session_span(session_id).entered(),
        }
    }
}

pub fn emit_round_started(session_id: &str, iteration: u32, kind: &str) {
    info!(event = "round.started", session_id = %session_id, iteration = iteration, kind = %kind);
}

pub fn emit_program_assembled(
    session_id: &str,
    iteration: u32,
    digest: &str,
    hoisted: usize,
    warnings: usize,
) {
    info!(
        event = "program.assembled",
        session_id = %session_id,
        iteration = iteration,
        digest = %digest,
        hoisted = hoisted,
        warnings = warnings,
    );
}

pub fn emit_execution_finished(session_id: &str, iteration: u32, success: bool, duration_ms: u64) {
    info!(
        event = "execution.finished",
        session_id = %session_id,
        iteration = iteration,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_decision_made(session_id: &str, iteration: u32, decision: &str, policy: &str) {
    info!(
        event = "decision.made",
        session_id = %session_id,
        iteration = iteration,
        decision = %decision,
        policy = %policy,
    );
}

/// Emit event: workflow ended with its termination reason.
pub fn emit_workflow_finished(session_id: &str, reason: &str, iterations: u32, success: bool) {
    info!(
        event = "workflow.finished",
        session_id = %session_id,
        reason = %reason,
        iterations = iterations,
        success = success,
    );
}

/// Emit event: a round raised an unexpected fault (warning level).
pub fn emit_round_fault(session_id: &str, iteration: u32, error: &dyn std::fmt::Display) {
    warn!(event = "round.fault", session_id = %session_id, iteration = iteration, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_session_span_create() {
        let _span = SessionSpan::enter("test-session");
    }

    #[test]
    #[traced_test]
    fn test_events_carry_names() {
        emit_round_started("s", 2, "correction");
        emit_decision_made("s", 2, "UPDATE_SOLVER", "rule_based");
        emit_round_fault("s", 2, &"boom");
        assert!(logs_contain("round.started"));
        assert!(logs_contain("UPDATE_SOLVER"));
        assert!(logs_contain("round.fault"));
    }
}
