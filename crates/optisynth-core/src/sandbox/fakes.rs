//! Scripted program runner for tests.
//!
//! `ScriptedRunner` satisfies [`ProgramRunner`] without an interpreter. Each
//! call consumes the next scripted step; once the script is exhausted the
//! fallback step repeats.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{ExecutionResult, ProgramRunner, RunContext, SandboxError, SandboxResult};
use crate::domain::AssembledProgram;

/// One scripted execution outcome.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Program succeeds and prints `stdout`.
    Succeed { stdout: String },
    /// Program raises; `error` becomes the traceback text.
    Fail { error: String },
    /// The sandbox itself faults.
    Fault(String),
}

impl ScriptedRun {
    pub fn succeed(stdout: impl Into<String>) -> Self {
        Self::Succeed {
            stdout: stdout.into(),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail {
            error: error.into(),
        }
    }

    fn realize(&self) -> SandboxResult<ExecutionResult> {
        match self {
            Self::Succeed { stdout } => Ok(ExecutionResult {
                success: true,
                stdout: stdout.clone(),
                stderr: String::new(),
                error: None,
                exit_code: Some(0),
                duration_ms: 1,
                program_path: None,
            }),
            Self::Fail { error } => Ok(ExecutionResult {
                success: false,
                stdout: String::new(),
                stderr: error.clone(),
                error: Some(error.clone()),
                exit_code: Some(1),
                duration_ms: 1,
                program_path: None,
            }),
            Self::Fault(reason) => Err(SandboxError::Io(std::io::Error::other(reason.clone()))),
        }
    }
}

/// Runner that replays a fixed script and records every program it saw.
#[derive(Debug)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<ScriptedRun>>,
    fallback: ScriptedRun,
    programs: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(script: impl IntoIterator<Item = ScriptedRun>, fallback: ScriptedRun) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            programs: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `error`.
    pub fn always_failing(error: impl Into<String>) -> Self {
        Self::new(Vec::new(), ScriptedRun::fail(error))
    }

    /// Sources of all programs run so far, in call order.
    pub fn programs(&self) -> Vec<String> {
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_step(&self, source: String) -> SandboxResult<ExecutionResult> {
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source);
        let step = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        step.realize()
    }
}

#[async_trait]
impl ProgramRunner for ScriptedRunner {
    async fn run_source(
        &self,
        program: &AssembledProgram,
        _ctx: &RunContext,
    ) -> SandboxResult<ExecutionResult> {
        self.next_step(program.source().to_string())
    }

    async fn run_file(&self, path: &Path, _ctx: &RunContext) -> SandboxResult<ExecutionResult> {
        let source = std::fs::read_to_string(path)?;
        self.next_step(source)
    }
}
