//! Isolated execution of assembled programs.
//!
//! Programs run in a child interpreter process with their own working
//! directory, module path and captured streams. A program that raises is a
//! failed [`ExecutionResult`], never a [`SandboxError`]; errors are reserved
//! for faults of the sandbox itself (spawn failure, timeout, io).

pub mod error;
pub mod execution;
pub mod fakes;
pub mod summary;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::AssembledProgram;

pub use error::{SandboxError, SandboxResult};
pub use execution::{interpreter_available, ExecutionSandbox, SandboxConfig, RUN_CONTEXT_ENV};
pub use summary::{RunSummary, StrategyOutcome, StrategyStatus};

/// Explicit per-run context handed to the executed program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub session_id: String,
    pub iteration: u32,
    /// Kind of program being run, e.g. `assembled_program`.
    pub artifact: String,
}

/// Outcome of one execution. Produced once per sandbox call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Full failure description (interpreter traceback) when unsuccessful.
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Where the program ran from. Temporary files are gone by the time the
    /// result is returned.
    pub program_path: Option<PathBuf>,
}

impl ExecutionResult {
    /// A failed result for a run that never reached the interpreter.
    pub fn fault(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(reason.into()),
            exit_code: None,
            duration_ms: 0,
            program_path: None,
        }
    }

    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }

    /// Structured summary printed by the program, if present.
    pub fn summary(&self) -> Option<RunSummary> {
        RunSummary::from_stdout(&self.stdout)
    }
}

/// Executes assembled programs.
#[async_trait]
pub trait ProgramRunner: Send + Sync {
    /// Materialize `program` to a temporary file, run it, then delete the file.
    async fn run_source(
        &self,
        program: &AssembledProgram,
        ctx: &RunContext,
    ) -> SandboxResult<ExecutionResult>;

    /// Run an existing file, leaving it untouched.
    async fn run_file(&self, path: &Path, ctx: &RunContext) -> SandboxResult<ExecutionResult>;
}
