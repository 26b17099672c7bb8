//! Sandbox behaviour against a real interpreter.
//!
//! Every test checks for the interpreter first and returns early when it is
//! missing.

use std::collections::BTreeMap;

use optisynth_core::{
    interpreter_available, AssembledProgram, ExecutionSandbox, FragmentAssembler, ProgramRunner,
    RunContext, SandboxConfig, SandboxError, Template,
};

async fn sandbox_in(dir: Option<&std::path::Path>) -> Option<ExecutionSandbox> {
    let config = SandboxConfig {
        artifact_dir: dir.map(|d| d.to_path_buf()),
        timeout_ms: Some(30_000),
        ..SandboxConfig::default()
    };
    if !interpreter_available(&config).await {
        eprintln!("python3 not available; skipping");
        return None;
    }
    Some(ExecutionSandbox::new(config).unwrap())
}

fn ctx(iteration: u32) -> RunContext {
    RunContext {
        session_id: "sandbox-test".into(),
        iteration,
        artifact: "assembled_program".into(),
    }
}

fn py_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".py"))
        .collect()
}

#[tokio::test]
async fn test_inline_fragment_program_prints_42() {
    let Some(sandbox) = sandbox_in(None).await else {
        return;
    };
    let template = Template::parse("result = {{INSERT_A}}\nprint(result)\n").unwrap();
    let fragments: BTreeMap<String, String> =
        [("A".to_string(), "def a():\n    return 42".to_string())].into();
    let program = FragmentAssembler::new().assemble(&template, &fragments).program;

    let result = sandbox.run_source(&program, &ctx(1)).await.unwrap();
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.stdout.trim(), "42");
}

#[tokio::test]
async fn test_raising_program_fails_and_artifact_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let Some(sandbox) = sandbox_in(Some(dir.path())).await else {
        return;
    };
    let program = AssembledProgram::new("def boom():\n    raise ValueError('bad bounds')\n\nboom()\n");

    let result = sandbox.run_source(&program, &ctx(1)).await.unwrap();
    assert!(!result.success);
    let error = result.error_text();
    assert!(error.contains("Traceback"), "{error}");
    assert!(error.contains("ValueError: bad bounds"));
    assert!(error.contains("boom"));
    assert!(py_files(dir.path()).is_empty(), "temporary program leaked");
    if let Some(path) = result.program_path {
        assert!(!path.exists());
    }
}

#[tokio::test]
async fn test_run_context_is_passed_explicitly() {
    let Some(sandbox) = sandbox_in(None).await else {
        return;
    };
    let program = AssembledProgram::new(
        "import json, os\nctx = json.loads(os.environ['OPTISYNTH_RUN_CONTEXT'])\nprint(ctx['iteration'], ctx['session_id'])\n",
    );
    let result = sandbox.run_source(&program, &ctx(3)).await.unwrap();
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.stdout.trim(), "3 sandbox-test");
}

#[tokio::test]
async fn test_materialized_file_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let Some(sandbox) = sandbox_in(None).await else {
        return;
    };
    std::fs::write(dir.path().join("helper.py"), "VALUE = 7\n").unwrap();
    let path = dir.path().join("main.py");
    let source = "import os\nimport helper\nprint(helper.VALUE, os.path.basename(os.getcwd()) != '')\n";
    std::fs::write(&path, source).unwrap();

    let first = sandbox.run_file(&path, &ctx(1)).await.unwrap();
    assert!(first.success, "{:?}", first.error);
    assert_eq!(first.stdout.trim(), "7 True");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), source);

    // A second run after editing the imported module must not see stale state.
    std::fs::write(dir.path().join("helper.py"), "VALUE = 80\n").unwrap();
    let second = sandbox.run_file(&path, &ctx(2)).await.unwrap();
    assert_eq!(second.stdout.trim(), "80 True");
}

#[tokio::test]
async fn test_summary_line_is_parsed() {
    let Some(sandbox) = sandbox_in(None).await else {
        return;
    };
    let program = AssembledProgram::new(
        "print('progress')\nprint('OPTISYNTH_SUMMARY {\"objective\": 0.5, \"converged\": true, \"strategies\": {\"de\": {\"status\": \"success\", \"objective\": 0.5}, \"ga\": {\"status\": \"failed\", \"objective\": NaN, \"error\": \"diverged\"}}}')\n",
    );
    let result = sandbox.run_source(&program, &ctx(1)).await.unwrap();
    let summary = result.summary().unwrap();
    assert_eq!(summary.best_strategy(), Some(("de", 0.5)));
    assert_eq!(summary.success_ratio(), Some(0.5));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_sandbox_error() {
    // The paused clock jumps straight to the limit while the child sleeps.
    let config = SandboxConfig {
        timeout_ms: Some(60_000),
        ..SandboxConfig::default()
    };
    if !interpreter_available(&config).await {
        return;
    }
    let sandbox = ExecutionSandbox::new(config).unwrap();
    let program = AssembledProgram::new("import time\ntime.sleep(600)\n");
    let err = sandbox.run_source(&program, &ctx(1)).await.unwrap_err();
    assert!(matches!(err, SandboxError::Timeout { limit_ms: 60_000 }));
}
