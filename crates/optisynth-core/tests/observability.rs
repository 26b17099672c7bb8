//! Tracing output of a workflow run.

use std::sync::Arc;

use optisynth_core::collaborator::fakes::ScriptedCollaborator;
use optisynth_core::obs::{emit_round_fault, SessionSpan};
use optisynth_core::sandbox::fakes::{ScriptedRun, ScriptedRunner};
use optisynth_core::{
    CollaboratorRole, Orchestrator, RuleBasedPolicy, Template, WorkflowConfig,
};
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn test_workflow_emits_lifecycle_events() {
    let collab = ScriptedCollaborator::new()
        .with_sticky_reply(CollaboratorRole::Designer, "return x[0]")
        .with_sticky_reply(CollaboratorRole::Solver, "return {}")
        .with_sticky_reply(CollaboratorRole::Reviewer, "STATUS: PASS");
    let runner = ScriptedRunner::new(vec![ScriptedRun::fail("boom")], ScriptedRun::succeed(""));
    let template = Template::parse(
        "def f(x):\n    # {{INSERT_OBJECTIVE_FUNCTION}}\n    pass\n\ndef g():\n    # {{INSERT_OPTIMIZATION_ALGORITHM}}\n    pass\n",
    )
    .unwrap();
    let mut orch = Orchestrator::new(
        template,
        Arc::new(collab),
        Arc::new(runner),
        WorkflowConfig::default(),
    )
    .unwrap()
    .with_policy(Arc::new(RuleBasedPolicy::default()))
    .with_session_id("obs-session");

    let outcome = orch.solve("p").await;
    assert!(outcome.success);

    for event in [
        "round.started",
        "program.assembled",
        "execution.finished",
        "decision.made",
        "workflow.finished",
    ] {
        assert!(logs_contain(event), "missing {event}");
    }
    assert!(logs_contain("NEED_CORRECTION"));
    assert!(logs_contain("obs-session"));
    assert!(logs_contain("metric=\"flush\""));
}

#[test]
#[traced_test]
fn test_round_fault_is_a_warning() {
    let _span = SessionSpan::enter("fault-session");
    emit_round_fault("fault-session", 3, &"collaborator unreachable");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("collaborator unreachable"));
}
