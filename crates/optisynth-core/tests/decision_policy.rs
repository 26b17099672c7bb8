//! Decision policies over realistic execution reports.

use std::sync::Arc;

use optisynth_core::collaborator::fakes::ScriptedCollaborator;
use optisynth_core::{
    CollaboratorPolicy, CollaboratorRole, DecisionInput, DecisionKind, DecisionPolicy,
    DecisionThresholds, ExecutionResult, RuleBasedPolicy,
};

fn run(success: bool, stdout: &str, error: Option<&str>) -> ExecutionResult {
    ExecutionResult {
        success,
        stdout: stdout.to_string(),
        stderr: error.unwrap_or_default().to_string(),
        error: error.map(str::to_string),
        exit_code: Some(if success { 0 } else { 1 }),
        duration_ms: 12,
        program_path: None,
    }
}

fn input(iteration: u32, execution: ExecutionResult, consecutive_failures: u32) -> DecisionInput {
    DecisionInput {
        problem: "minimize network losses".into(),
        iteration,
        max_iterations: 5,
        summary: execution.summary(),
        execution: Some(execution),
        consecutive_failures,
    }
}

#[tokio::test]
async fn test_finite_objective_on_first_round_terminates_successfully() {
    let policy = RuleBasedPolicy::default();
    let exec = run(true, "OPTISYNTH_SUMMARY {\"objective\": 12.75, \"converged\": true}\n", None);
    let decision = policy.decide(&input(1, exec, 0)).await;
    assert_eq!(decision.kind, DecisionKind::TerminateSuccess);
}

#[tokio::test]
async fn test_syntax_error_requests_correction_with_error_feedback() {
    let policy = RuleBasedPolicy::default();
    let exec = run(false, "", Some("  File \"prog.py\", line 3\nSyntaxError: invalid syntax"));
    let decision = policy.decide(&input(1, exec, 1)).await;
    assert_eq!(decision.kind, DecisionKind::NeedCorrection);
    assert!(decision.feedback.contains("SyntaxError"));
}

#[tokio::test]
async fn test_rules_are_total_over_a_grid_of_inputs() {
    let policy = RuleBasedPolicy::new(DecisionThresholds::default());
    let stdouts = [
        "",
        "no summary here",
        "OPTISYNTH_SUMMARY {\"objective\": Infinity}",
        "OPTISYNTH_SUMMARY {\"objective\": 1.0, \"converged\": false}",
        "OPTISYNTH_SUMMARY {\"strategies\": {\"a\": {\"status\": \"failed\", \"error\": \"x\"}}}",
        "OPTISYNTH_SUMMARY {\"strategies\": {\"a\": {\"status\": \"success\", \"objective\": 1.0}, \"b\": {\"status\": \"failed\"}, \"c\": {\"status\": \"failed\"}}}",
        "OPTISYNTH_SUMMARY not json",
    ];
    for iteration in 1..=5 {
        for failures in 0..3 {
            for stdout in stdouts {
                for success in [true, false] {
                    let exec = run(success, stdout, (!success).then_some("boom"));
                    let decision = policy.decide(&input(iteration, exec, failures)).await;
                    assert!(DecisionKind::ALL.contains(&decision.kind));
                    assert!(!decision.reason.is_empty());
                }
            }
        }
        let empty = DecisionInput {
            iteration,
            max_iterations: 5,
            ..DecisionInput::default()
        };
        let decision = policy.decide(&empty).await;
        assert!(DecisionKind::ALL.contains(&decision.kind));
    }
}

#[tokio::test]
async fn test_collaborator_policy_uses_manager_reply() {
    let collaborator = Arc::new(ScriptedCollaborator::new().with_reply(
        CollaboratorRole::Manager,
        "DECISION: UPDATE_SOLVER\nREASON: plateau\nNEXT_ACTION: regenerate\nFEEDBACK: widen the search bounds",
    ));
    let policy = CollaboratorPolicy::new(collaborator.clone(), DecisionThresholds::default());
    let exec = run(true, "OPTISYNTH_SUMMARY {\"objective\": 3.0}", None);
    let decision = policy.decide(&input(2, exec, 0)).await;
    assert_eq!(decision.kind, DecisionKind::UpdateSolver);
    assert_eq!(decision.feedback, "widen the search bounds");
    let prompt = &collaborator.prompts_for(CollaboratorRole::Manager)[0];
    assert!(prompt.contains("Iteration 2 of 5"));
}

#[tokio::test]
async fn test_collaborator_policy_falls_back_on_ambiguous_reply() {
    let collaborator = Arc::new(
        ScriptedCollaborator::new()
            .with_reply(CollaboratorRole::Manager, "Looks good, maybe keep going?")
            .with_fault(CollaboratorRole::Manager, "503 from upstream"),
    );
    let policy = CollaboratorPolicy::new(collaborator, DecisionThresholds::default());

    let exec = run(true, "OPTISYNTH_SUMMARY {\"objective\": 3.0}", None);
    let first = policy.decide(&input(1, exec.clone(), 0)).await;
    assert_eq!(first.kind, DecisionKind::TerminateSuccess);
    assert!(first.reason.starts_with("rule-based fallback"));

    let second = policy.decide(&input(1, exec, 0)).await;
    assert_eq!(second.kind, DecisionKind::TerminateSuccess);
    assert!(second.reason.contains("503 from upstream"));
}
