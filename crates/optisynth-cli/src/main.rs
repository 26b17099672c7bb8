//! Optisynth CLI
//!
//! The `optisynth` command synthesizes optimization programs from
//! collaborator-generated fragments.
//!
//! ## Commands
//!
//! - `run`: Full workflow (collaborate, assemble, review, execute, repair)
//! - `assemble`: Merge fragment files into a template
//! - `execute`: Run an existing program file in the sandbox
//! - `summarize`: Verify and print an exported ledger summary

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use optisynth_core::ledger::{read_summary, write_summary};
use optisynth_core::{
    ExecutionSandbox, FragmentAssembler, OptisynthConfig, Orchestrator, ProgramRunner,
    RuleBasedPolicy, RunContext, Template, WorkflowOutcome,
};
use optisynth_gateway::ChatGateway;

#[derive(Parser)]
#[command(name = "optisynth")]
#[command(version = optisynth_core::VERSION)]
#[command(about = "Collaborative synthesis of optimization programs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "OPTISYNTH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full synthesis workflow
    Run {
        /// Problem statement
        #[arg(short, long, conflicts_with = "problem_file")]
        problem: Option<String>,

        /// Read the problem statement from a file
        #[arg(long)]
        problem_file: Option<PathBuf>,

        /// Template file (default: built-in optimization template)
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Round ceiling, overriding the configuration
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Decide rounds with the built-in rules instead of the manager collaborator
        #[arg(long)]
        rule_based: bool,

        /// Directory for the exported ledger summary
        #[arg(long)]
        summary_dir: Option<PathBuf>,

        /// Write the final program here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Assemble fragment files into a template
    Assemble {
        /// Template file (default: built-in optimization template)
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Fragment as NAME=PATH (repeatable)
        #[arg(short, long = "fragment", value_parser = parse_fragment_arg)]
        fragments: Vec<(String, PathBuf)>,

        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a program file in the sandbox
    Execute {
        /// Program to run; left untouched
        file: PathBuf,

        /// Wall-clock limit in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print a verified ledger summary
    Summarize {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Directory the summary was exported to
        #[arg(long, default_value = ".optisynth/ledger")]
        summary_dir: PathBuf,
    },
}

fn parse_fragment_arg(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    let (name, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() || path.trim().is_empty() {
        return Err(format!("expected NAME=PATH, got {raw:?}"));
    }
    Ok((name.to_string(), PathBuf::from(path.trim())))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    optisynth_core::telemetry::init_tracing(cli.json, level);

    let config = OptisynthConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            problem,
            problem_file,
            template,
            max_iterations,
            rule_based,
            summary_dir,
            output,
        } => {
            let problem = match (problem, problem_file) {
                (Some(problem), _) => problem,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read problem file {}", path.display()))?,
                (None, None) => bail!("either --problem or --problem-file is required"),
            };
            let success = cmd_run(
                config,
                &problem,
                template.as_deref(),
                max_iterations,
                rule_based,
                summary_dir.as_deref(),
                output.as_deref(),
            )
            .await?;
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Assemble {
            template,
            fragments,
            output,
        } => cmd_assemble(template.as_deref(), &fragments, output.as_deref()),
        Commands::Execute { file, timeout_ms } => {
            let success = cmd_execute(config, &file, timeout_ms).await?;
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Summarize {
            session,
            summary_dir,
        } => cmd_summarize(&session, &summary_dir),
    }
}

fn load_template(path: Option<&Path>) -> Result<Template> {
    match path {
        Some(path) => Template::from_file(path)
            .with_context(|| format!("Failed to load template {}", path.display())),
        None => Template::optimization_default().context("Built-in template is invalid"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Compact report printed after a run.
#[derive(Serialize)]
struct RunReport<'a> {
    session_id: &'a str,
    success: bool,
    termination_reason: &'a str,
    iterations: u32,
    error: Option<&'a str>,
    best_objective: Option<f64>,
    summary_path: Option<String>,
}

fn run_report<'a>(outcome: &'a WorkflowOutcome, summary_path: Option<&Path>) -> RunReport<'a> {
    RunReport {
        session_id: &outcome.session_id,
        success: outcome.success,
        termination_reason: outcome.termination_reason.as_str(),
        iterations: outcome.iterations,
        error: outcome.error.as_deref(),
        best_objective: outcome
            .last_execution
            .as_ref()
            .and_then(|e| e.summary())
            .and_then(|s| s.best_objective()),
        summary_path: summary_path.map(|p| p.display().to_string()),
    }
}

async fn cmd_run(
    mut config: OptisynthConfig,
    problem: &str,
    template: Option<&Path>,
    max_iterations: Option<u32>,
    rule_based: bool,
    summary_dir: Option<&Path>,
    output: Option<&Path>,
) -> Result<bool> {
    if let Some(max) = max_iterations {
        config.workflow.max_iterations = max;
    }
    config.validate()?;

    let template = load_template(template)?;
    let gateway = ChatGateway::new(config.gateway.clone()).context("Failed to build gateway")?;
    let sandbox = ExecutionSandbox::new(config.sandbox.clone()).context("Invalid sandbox configuration")?;

    let mut orchestrator = Orchestrator::new(
        template,
        Arc::new(gateway),
        Arc::new(sandbox),
        config.workflow.clone(),
    )?;
    if rule_based {
        orchestrator = orchestrator.with_policy(Arc::new(RuleBasedPolicy::new(
            config.workflow.thresholds.clone(),
        )));
    }

    info!(session_id = %orchestrator.session_id(), "starting workflow");
    let outcome = orchestrator.solve(problem).await;

    let summary_path = match summary_dir {
        Some(dir) => Some(
            write_summary(&outcome.ledger, dir)
                .with_context(|| format!("Failed to export ledger summary to {}", dir.display()))?,
        ),
        None => None,
    };
    if let (Some(path), Some(program)) = (output, outcome.final_program.as_deref()) {
        std::fs::write(path, program)
            .with_context(|| format!("Failed to write program to {}", path.display()))?;
        info!(path = %path.display(), "final program written");
    }

    print_json(&run_report(&outcome, summary_path.as_deref()))?;
    Ok(outcome.success)
}

fn cmd_assemble(
    template: Option<&Path>,
    fragments: &[(String, PathBuf)],
    output: Option<&Path>,
) -> Result<()> {
    let template = load_template(template)?;
    let mut texts = BTreeMap::new();
    for (name, path) in fragments {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fragment {}", path.display()))?;
        texts.insert(name.clone(), optisynth_core::extract_code(&text));
    }

    let assembly = FragmentAssembler::new().assemble(&template, &texts);
    for warning in &assembly.warnings {
        tracing::warn!(%warning, "assembly warning");
    }
    if let Some(diagnostic) = optisynth_core::syntax_check(assembly.program.source()) {
        tracing::warn!(%diagnostic, "assembled program does not parse");
    }

    match output {
        Some(path) => {
            std::fs::write(path, assembly.program.source())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                path = %path.display(),
                digest = %assembly.program.digest().short(),
                hoisted = assembly.hoisted,
                "program assembled"
            );
        }
        None => print!("{}", assembly.program.source()),
    }
    Ok(())
}

async fn cmd_execute(mut config: OptisynthConfig, file: &Path, timeout_ms: Option<u64>) -> Result<bool> {
    if let Some(ms) = timeout_ms {
        config.sandbox.timeout_ms = Some(ms);
    }
    let sandbox = ExecutionSandbox::new(config.sandbox).context("Invalid sandbox configuration")?;
    let ctx = RunContext {
        session_id: "cli".to_string(),
        iteration: 0,
        artifact: "program_file".to_string(),
    };
    let result = sandbox
        .run_file(file, &ctx)
        .await
        .with_context(|| format!("Failed to execute {}", file.display()))?;

    print!("{}", result.stdout);
    if !result.success {
        eprintln!("{}", result.error_text());
    }
    info!(success = result.success, duration_ms = result.duration_ms, "execution finished");
    Ok(result.success)
}

fn cmd_summarize(session: &str, summary_dir: &Path) -> Result<()> {
    let _span = optisynth_core::obs::SessionSpan::enter(session);
    let summary = read_summary(session, summary_dir)
        .with_context(|| format!("Failed to read ledger summary for session {session}"))?;
    print_json(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use optisynth_core::{ArtifactKind, CodeLedger};

    #[test]
    fn test_parse_fragment_arg() {
        let (name, path) = parse_fragment_arg("OBJECTIVE_FUNCTION=frag/obj.py").unwrap();
        assert_eq!(name, "OBJECTIVE_FUNCTION");
        assert_eq!(path, PathBuf::from("frag/obj.py"));
        assert!(parse_fragment_arg("no-equals").is_err());
        assert!(parse_fragment_arg("=x.py").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "optisynth",
            "--verbose",
            "run",
            "--problem",
            "minimize",
            "--max-iterations",
            "3",
            "--rule-based",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                problem,
                max_iterations,
                rule_based,
                ..
            } => {
                assert_eq!(problem.as_deref(), Some("minimize"));
                assert_eq!(max_iterations, Some(3));
                assert!(rule_based);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cmd_assemble_writes_program() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.py");
        std::fs::write(&template, "def f(x):\n    # {{INSERT_BODY}}\n").unwrap();
        let fragment = dir.path().join("body.py");
        std::fs::write(&fragment, "```python\ny = x + 1\nreturn y\n```\n").unwrap();
        let output = dir.path().join("out.py");

        cmd_assemble(
            Some(&template),
            &[("BODY".to_string(), fragment)],
            Some(&output),
        )
        .unwrap();

        let program = std::fs::read_to_string(&output).unwrap();
        assert!(program.starts_with("def f(x):\n    y = x + 1\n    return y"));
        assert!(!program.contains("INSERT_"));
        assert!(!program.contains("```"));
    }

    #[test]
    fn test_cmd_summarize_reads_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = CodeLedger::new("cli-session");
        ledger.append(1, ArtifactKind::AssembledProgram, "print(1)");
        write_summary(&ledger.summary(), dir.path()).unwrap();

        cmd_summarize("cli-session", dir.path()).unwrap();
        assert!(cmd_summarize("missing", dir.path()).is_err());
    }
}
