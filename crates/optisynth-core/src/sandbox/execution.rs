//! Interpreter-backed execution of assembled programs.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::{SandboxError, SandboxResult};
use super::{ExecutionResult, ProgramRunner, RunContext};
use crate::domain::AssembledProgram;

/// Environment variable carrying the JSON-encoded [`RunContext`].
pub const RUN_CONTEXT_ENV: &str = "OPTISYNTH_RUN_CONTEXT";

/// Configuration for program execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter executable.
    pub interpreter: String,
    /// Arguments placed before the program path.
    pub interpreter_args: Vec<String>,
    /// Wall-clock limit for one execution (milliseconds). `None` waits forever.
    pub timeout_ms: Option<u64>,
    /// Directory for temporary program files; the system temp dir otherwise.
    pub artifact_dir: Option<PathBuf>,
    /// Extra environment passed to the program.
    pub env: BTreeMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-u".to_string()],
            timeout_ms: None,
            artifact_dir: None,
            env: BTreeMap::new(),
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> SandboxResult<()> {
        if self.interpreter.trim().is_empty() {
            return Err(SandboxError::InvalidConfig(
                "interpreter must not be empty".into(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(SandboxError::InvalidConfig(
                "timeout_ms must be positive when set".into(),
            ));
        }
        if self.env.contains_key(RUN_CONTEXT_ENV) {
            return Err(SandboxError::InvalidConfig(format!(
                "{RUN_CONTEXT_ENV} is reserved"
            )));
        }
        Ok(())
    }
}

/// Remove cached bytecode for the program so a later run under the same
/// name recompiles from source.
fn invalidate_bytecode(program: &Path) {
    let (Some(dir), Some(stem)) = (program.parent(), program.file_stem()) else {
        return;
    };
    let cache = dir.join("__pycache__");
    let Ok(entries) = std::fs::read_dir(&cache) else {
        return;
    };
    let prefix = format!("{}.", stem.to_string_lossy());
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".pyc") {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                debug!(path = %entry.path().display(), error = %e, "stale bytecode not removed");
            }
        }
    }
}

fn module_search_path(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PYTHONPATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_os_string())
}

/// Runs programs in a child interpreter process.
///
/// The child gets its own working directory and module search path, so
/// nothing in the calling process is changed by a run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSandbox {
    config: SandboxConfig,
}

impl ExecutionSandbox {
    pub fn new(config: SandboxConfig) -> SandboxResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    async fn run_path(&self, path: &Path, ctx: &RunContext) -> SandboxResult<ExecutionResult> {
        let path = path.canonicalize()?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(&self.config.interpreter_args)
            .arg(&path)
            .current_dir(&dir)
            .envs(&self.config.env)
            .env("PYTHONPATH", module_search_path(&dir))
            .env(RUN_CONTEXT_ENV, serde_json::to_string(ctx)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            interpreter: self.config.interpreter.clone(),
            source,
        })?;

        let output = match self.config.timeout_ms {
            Some(limit_ms) => {
                let waited =
                    tokio::time::timeout(Duration::from_millis(limit_ms), child.wait_with_output())
                        .await;
                match waited {
                    Ok(output) => output,
                    Err(_) => {
                        invalidate_bytecode(&path);
                        return Err(SandboxError::Timeout { limit_ms });
                    }
                }
            }
            None => child.wait_with_output().await,
        };
        invalidate_bytecode(&path);
        let output = output?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();
        let success = output.status.success();

        let error = if success {
            None
        } else if !stderr.trim().is_empty() {
            Some(stderr.trim_end().to_string())
        } else {
            Some(match exit_code {
                Some(code) => format!("program exited with status {code}"),
                None => "program terminated by signal".to_string(),
            })
        };

        Ok(ExecutionResult {
            success,
            stdout,
            stderr,
            error,
            exit_code,
            duration_ms,
            program_path: Some(path),
        })
    }
}

#[async_trait]
impl ProgramRunner for ExecutionSandbox {
    async fn run_source(
        &self,
        program: &AssembledProgram,
        ctx: &RunContext,
    ) -> SandboxResult<ExecutionResult> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("optisynth_").suffix(".py");
        let file = match &self.config.artifact_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };
        std::fs::write(file.path(), program.source())?;
        debug!(path = %file.path().display(), bytes = program.len(), "program materialized");

        let result = self.run_path(file.path(), ctx).await;
        let artifact = file.path().to_path_buf();
        if let Err(e) = file.close() {
            warn!(path = %artifact.display(), error = %e, "temporary program not removed");
        }
        result
    }

    async fn run_file(&self, path: &Path, ctx: &RunContext) -> SandboxResult<ExecutionResult> {
        self.run_path(path, ctx).await
    }
}

/// True when the configured interpreter can be started.
pub async fn interpreter_available(config: &SandboxConfig) -> bool {
    Command::new(&config.interpreter)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_default() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.interpreter, "python3");
        assert_eq!(cfg.interpreter_args, vec!["-u".to_string()]);
        assert!(cfg.timeout_ms.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sandbox_config_rejects_zero_timeout() {
        let cfg = SandboxConfig {
            timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(SandboxError::InvalidConfig(_))));
    }

    #[test]
    fn test_sandbox_config_rejects_reserved_env() {
        let mut cfg = SandboxConfig::default();
        cfg.env.insert(RUN_CONTEXT_ENV.into(), "{}".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sandbox_config_serde_defaults() {
        let cfg: SandboxConfig = serde_json::from_str(r#"{"timeout_ms": 500}"#).unwrap();
        assert_eq!(cfg.timeout_ms, Some(500));
        assert_eq!(cfg.interpreter, "python3");
    }

    #[test]
    fn test_invalidate_bytecode_removes_matching_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("__pycache__");
        std::fs::create_dir(&cache).unwrap();
        std::fs::write(cache.join("prog.cpython-311.pyc"), b"x").unwrap();
        std::fs::write(cache.join("other.cpython-311.pyc"), b"x").unwrap();

        invalidate_bytecode(&dir.path().join("prog.py"));

        assert!(!cache.join("prog.cpython-311.pyc").exists());
        assert!(cache.join("other.cpython-311.pyc").exists());
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let sandbox = ExecutionSandbox::new(SandboxConfig {
            interpreter: "optisynth-no-such-interpreter".into(),
            ..Default::default()
        })
        .unwrap();
        let program = AssembledProgram::new("print(1)");
        let err = sandbox
            .run_source(&program, &RunContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_missing_interpreter_not_available() {
        let cfg = SandboxConfig {
            interpreter: "optisynth-no-such-interpreter".into(),
            ..Default::default()
        };
        assert!(!interpreter_available(&cfg).await);
    }
}
