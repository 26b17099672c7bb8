//! Bounded repair loop over collaborators, assembler and sandbox.
//!
//! The first round always runs in full: designer fragment, solver fragment,
//! assembly, review, execution. Every later round starts from one
//! [`ManagerDecision`]: `NEED_CORRECTION` sends the latest program back to
//! the reviewer with an error log, `UPDATE_SOLVER` regenerates the solver
//! fragment and reassembles it with the unchanged designer fragment, and the
//! two terminal kinds stop the loop. The loop never runs more than
//! `max_iterations` rounds.
//!
//! A correction round re-executes the unchanged program only on a `PASS`
//! verdict. `NEEDS_MODIFICATION` without a usable corrected program (missing,
//! empty or identical to the current one) fails the round instead.
//!
//! Faults inside a round (unreachable collaborator, sandbox fault, even a
//! panic) are caught at the round boundary and recorded as a failed
//! execution; [`Orchestrator::solve`] itself never fails.

pub mod outcome;
pub mod state;

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn, Instrument};

use crate::assembler::{syntax_check, AssemblyWarning, FragmentAssembler, Template};
use crate::collaborator::{call_non_empty, extract_code, prompts, Collaborator, CollaboratorRole};
use crate::config::WorkflowConfig;
use crate::decision::{DecisionKind, ManagerDecision};
use crate::domain::{AssembledProgram, Fragment, OptisynthError, Result};
use crate::ledger::{ArtifactKind, CodeLedger, EntryOptions};
use crate::metrics::WorkflowMetrics;
use crate::obs;
use crate::policy::{tail_excerpt, CollaboratorPolicy, DecisionInput, DecisionPolicy};
use crate::sandbox::{ExecutionResult, ProgramRunner, RunContext};
use crate::verdict::ReviewVerdict;

pub use outcome::{RoundKind, RoundOutcome, WorkflowOutcome};
pub use state::{final_success, should_terminate, TerminationReason, WorkflowPhase, WorkflowState};

/// Drives one workflow session at a time.
///
/// The ledger and state belong to this instance alone; nothing is shared
/// across orchestrators.
pub struct Orchestrator {
    template: Template,
    assembler: FragmentAssembler,
    collaborator: Arc<dyn Collaborator>,
    runner: Arc<dyn ProgramRunner>,
    policy: Arc<dyn DecisionPolicy>,
    config: WorkflowConfig,
    session_id: String,
    ledger: CodeLedger,
    state: WorkflowState,
    metrics: WorkflowMetrics,
    problem: String,
    designer_fragment: Option<Fragment>,
    solver_fragment: Option<Fragment>,
    designer_history: Vec<String>,
    solver_history: Vec<String>,
    current_program: Option<AssembledProgram>,
    rounds: Vec<RoundOutcome>,
}

impl Orchestrator {
    /// Build an orchestrator whose decisions come from the manager
    /// collaborator (with rule-based fallback).
    pub fn new(
        template: Template,
        collaborator: Arc<dyn Collaborator>,
        runner: Arc<dyn ProgramRunner>,
        config: WorkflowConfig,
    ) -> Result<Self> {
        config.validate()?;
        for name in [&config.designer_placeholder, &config.solver_placeholder] {
            if !template.contains(name) {
                warn!(placeholder = %name, "template has no such placeholder; its fragment will be dropped");
            }
        }
        let policy: Arc<dyn DecisionPolicy> = Arc::new(
            CollaboratorPolicy::new(collaborator.clone(), config.thresholds.clone())
                .with_error_chars(config.error_log_chars),
        );
        let session_id = uuid::Uuid::new_v4().to_string();
        Ok(Self {
            template,
            assembler: FragmentAssembler::new(),
            collaborator,
            runner,
            policy,
            state: WorkflowState::new(config.max_iterations),
            config,
            ledger: CodeLedger::new(session_id.clone()),
            session_id,
            metrics: WorkflowMetrics::new(),
            problem: String::new(),
            designer_fragment: None,
            solver_fragment: None,
            designer_history: Vec::new(),
            solver_history: Vec::new(),
            current_program: None,
            rounds: Vec::new(),
        })
    }

    /// Replace the decision policy.
    pub fn with_policy(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Use a caller-chosen session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self.ledger = CodeLedger::new(self.session_id.clone());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn ledger(&self) -> &CodeLedger {
        &self.ledger
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn metrics(&self) -> &WorkflowMetrics {
        &self.metrics
    }

    /// Run a complete workflow for `problem`.
    ///
    /// Each call starts a fresh session: state, ledger and working memory
    /// from an earlier call are discarded.
    pub async fn solve(&mut self, problem: &str) -> WorkflowOutcome {
        self.reset(problem);
        let span = obs::session_span(&self.session_id);
        self.run().instrument(span).await
    }

    async fn run(&mut self) -> WorkflowOutcome {
        info!(max_iterations = self.config.max_iterations, "workflow started");

        let max = self.config.max_iterations;
        self.state.iteration = 1;
        let first = self.round(RoundKind::Initial, None).await;
        self.close_round(first);

        let mut reason = None;
        let mut iteration = 1;
        while iteration < max {
            let decision = self.decide(iteration).await;
            let kind = decision.kind;

            if !kind.is_terminal() {
                let next = iteration + 1;
                self.state.iteration = next;
                let round_kind = match kind {
                    DecisionKind::UpdateSolver => RoundKind::Regeneration,
                    _ => RoundKind::Correction,
                };
                let outcome = self.round(round_kind, Some(decision)).await;
                self.close_round(outcome);
                iteration = next;
            }

            if should_terminate(kind, self.state.last_execution.as_ref()) {
                reason = Some(TerminationReason::from_decision(kind));
                break;
            }
        }

        self.finish(reason.unwrap_or(TerminationReason::MaxIterations))
    }

    fn reset(&mut self, problem: &str) {
        if !self.ledger.is_empty() {
            self.session_id = uuid::Uuid::new_v4().to_string();
        }
        self.ledger = CodeLedger::new(self.session_id.clone());
        self.state = WorkflowState::new(self.config.max_iterations);
        self.metrics = WorkflowMetrics::new();
        self.problem = problem.to_string();
        self.designer_fragment = None;
        self.solver_fragment = None;
        self.designer_history.clear();
        self.solver_history.clear();
        self.current_program = None;
        self.rounds.clear();
    }

    fn enter_phase(&mut self, phase: WorkflowPhase) {
        if self.state.phase != phase {
            debug!(from = %self.state.phase, to = %phase, iteration = self.state.iteration, "phase transition");
            self.state.phase = phase;
        }
    }

    async fn decide(&mut self, iteration: u32) -> ManagerDecision {
        let last = self.state.last_execution.clone();
        let input = DecisionInput {
            problem: self.problem.clone(),
            iteration,
            max_iterations: self.config.max_iterations,
            summary: last.as_ref().and_then(ExecutionResult::summary),
            execution: last,
            consecutive_failures: self.state.consecutive_failures,
        };
        let decision = self.policy.decide(&input).await;
        self.ledger.append_with(
            iteration,
            ArtifactKind::ManagerDecision,
            decision.to_wire(),
            EntryOptions::default().with_note(self.policy.name()),
        );
        obs::emit_decision_made(&self.session_id, iteration, decision.kind.as_str(), self.policy.name());
        decision
    }

    /// Run one round behind the fault boundary.
    async fn round(&mut self, kind: RoundKind, decision: Option<ManagerDecision>) -> RoundOutcome {
        let iteration = self.state.iteration;
        self.metrics.inc_rounds();
        obs::emit_round_started(&self.session_id, iteration, kind.as_str());

        let mut draft = RoundOutcome::new(iteration, kind, decision);
        let feedback = draft
            .decision
            .as_ref()
            .map(|d| d.feedback.clone())
            .unwrap_or_default();

        let result = AssertUnwindSafe(self.round_inner(kind, &feedback, &mut draft))
            .catch_unwind()
            .await;

        let fault = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };
        if let Some(fault) = fault {
            self.metrics.inc_faults();
            obs::emit_round_fault(&self.session_id, iteration, &fault);
            if draft.execution.is_none() {
                let execution = ExecutionResult::fault(fault.clone());
                self.record_execution_entry(iteration, &execution);
                draft.execution = Some(execution);
            }
            draft.error = Some(fault);
        }
        draft
    }

    async fn round_inner(
        &mut self,
        kind: RoundKind,
        feedback: &str,
        draft: &mut RoundOutcome,
    ) -> Result<()> {
        match kind {
            RoundKind::Initial => self.initial_round(draft).await,
            RoundKind::Correction | RoundKind::Reconfirm => {
                self.correction_round(feedback, draft).await
            }
            RoundKind::Regeneration => self.regeneration_round(feedback, draft).await,
        }
    }

    async fn initial_round(&mut self, draft: &mut RoundOutcome) -> Result<()> {
        let iteration = self.state.iteration;
        draft.kind = RoundKind::Initial;
        self.enter_phase(WorkflowPhase::Collaborating);

        let prompt = prompts::designer_prompt(&self.problem, &self.designer_history);
        let objective = self.generate(CollaboratorRole::Designer, &prompt).await?;
        self.ledger
            .append(iteration, ArtifactKind::DesignerFragment, objective.as_str());
        self.designer_history.push(objective.clone());
        self.designer_fragment = Some(Fragment::new(
            self.config.designer_placeholder.clone(),
            objective,
        ));

        self.generate_solver(None).await?;

        let program = self.assemble(draft)?;
        let error_log = syntax_check(program.source());
        let program = match self.review(&program, error_log, draft).await? {
            Some(corrected) => {
                self.record_correction(iteration, &corrected, "initial_review");
                corrected
            }
            None => program,
        };
        self.execute(program, ArtifactKind::AssembledProgram, draft).await
    }

    async fn correction_round(&mut self, feedback: &str, draft: &mut RoundOutcome) -> Result<()> {
        let Some(program) = self.current_program.clone() else {
            info!("no program to correct yet; repeating the initial collaboration");
            return self.initial_round(draft).await;
        };
        let iteration = self.state.iteration;
        self.enter_phase(WorkflowPhase::Correcting);
        self.metrics.inc_corrections();

        let error_log = self.correction_log(feedback, &program);
        match self.review(&program, Some(error_log), draft).await? {
            Some(corrected) => {
                draft.kind = RoundKind::Correction;
                self.record_correction(iteration, &corrected, "full_code_correction");
                self.execute(corrected, ArtifactKind::CorrectedProgram, draft).await
            }
            None if draft.review.as_ref().is_some_and(ReviewVerdict::needs_modification) => {
                draft.kind = RoundKind::Correction;
                Err(OptisynthError::generation(
                    CollaboratorRole::Reviewer,
                    "requested a modification without a usable corrected program",
                ))
            }
            None => {
                draft.kind = RoundKind::Reconfirm;
                info!("reviewer passed the program; re-executing it");
                self.execute(program, ArtifactKind::AssembledProgram, draft).await
            }
        }
    }

    async fn regeneration_round(&mut self, feedback: &str, draft: &mut RoundOutcome) -> Result<()> {
        if self.designer_fragment.is_none() {
            info!("no designer fragment yet; repeating the initial collaboration");
            return self.initial_round(draft).await;
        }
        self.enter_phase(WorkflowPhase::Regenerating);
        self.metrics.inc_regenerations();
        draft.kind = RoundKind::Regeneration;

        self.generate_solver(Some(feedback)).await?;
        let program = self.assemble(draft)?;
        self.execute(program, ArtifactKind::AssembledProgram, draft).await
    }

    async fn generate(&self, role: CollaboratorRole, prompt: &str) -> Result<String> {
        let reply = call_non_empty(self.collaborator.as_ref(), role, prompt)
            .await
            .map_err(|e| OptisynthError::generation(role, e.to_string()))?;
        let code = extract_code(&reply);
        if code.trim().is_empty() {
            return Err(OptisynthError::generation(role, "reply contained no code"));
        }
        Ok(code)
    }

    /// Ask the solver for a fragment; `feedback` marks a regeneration.
    async fn generate_solver(&mut self, feedback: Option<&str>) -> Result<()> {
        let iteration = self.state.iteration;
        let objective = self
            .designer_fragment
            .as_ref()
            .map(|f| f.text.clone())
            .unwrap_or_default();
        let prompt =
            prompts::solver_prompt(&self.problem, &objective, &self.solver_history, feedback);
        let solver = self.generate(CollaboratorRole::Solver, &prompt).await?;

        let options = match feedback {
            Some(feedback) => EntryOptions::regenerated().with_note(feedback),
            None => EntryOptions::default(),
        };
        self.ledger
            .append_with(iteration, ArtifactKind::SolverFragment, solver.as_str(), options);
        self.solver_history.push(solver.clone());
        self.solver_fragment = Some(Fragment::new(self.config.solver_placeholder.clone(), solver));
        Ok(())
    }

    fn assemble(&mut self, draft: &mut RoundOutcome) -> Result<AssembledProgram> {
        let iteration = self.state.iteration;
        self.enter_phase(WorkflowPhase::Assembling);

        let fragments: BTreeMap<String, String> = [&self.designer_fragment, &self.solver_fragment]
            .into_iter()
            .flatten()
            .map(|f| (f.placeholder.clone(), f.text.clone()))
            .collect();
        let assembly = self.assembler.assemble(&self.template, &fragments);

        for warning in &assembly.warnings {
            warn!(iteration, %warning, "assembly warning");
        }
        let fallbacks = assembly
            .warnings
            .iter()
            .filter(|w| matches!(w, AssemblyWarning::StructuralFallback { .. }))
            .count();
        self.metrics.add_structural_fallbacks(fallbacks as u64);

        let program = assembly.program;
        let options = if draft.kind == RoundKind::Regeneration {
            EntryOptions::regenerated()
        } else {
            EntryOptions::default()
        };
        self.ledger.append_with(
            iteration,
            ArtifactKind::AssembledProgram,
            program.source(),
            options,
        );
        obs::emit_program_assembled(
            &self.session_id,
            iteration,
            program.digest().short(),
            assembly.hoisted,
            assembly.warnings.len(),
        );
        draft.warnings.extend(assembly.warnings);
        self.current_program = Some(program.clone());
        Ok(program)
    }

    /// Review `program`; returns the reviewer's replacement when it asks for one.
    async fn review(
        &mut self,
        program: &AssembledProgram,
        error_log: Option<String>,
        draft: &mut RoundOutcome,
    ) -> Result<Option<AssembledProgram>> {
        let iteration = self.state.iteration;
        self.enter_phase(WorkflowPhase::Reviewing);

        let prompt = prompts::reviewer_prompt(&self.problem, program.source(), error_log.as_deref());
        let reply = call_non_empty(self.collaborator.as_ref(), CollaboratorRole::Reviewer, &prompt)
            .await
            .map_err(|e| OptisynthError::generation(CollaboratorRole::Reviewer, e.to_string()))?;
        let verdict = ReviewVerdict::parse_or_default(&reply);
        self.ledger.append(
            iteration,
            ArtifactKind::ReviewVerdict,
            serde_json::to_string(&verdict)?,
        );
        debug!(iteration, status = %verdict.status, issues = verdict.issues.len(), "review verdict");

        let corrected = verdict
            .needs_modification()
            .then(|| verdict.corrected_program())
            .flatten()
            .map(extract_code)
            .filter(|code| !code.trim().is_empty() && code.as_str() != program.source())
            .map(AssembledProgram::new);
        draft.review = Some(verdict);
        Ok(corrected)
    }

    fn record_correction(&mut self, iteration: u32, program: &AssembledProgram, note: &str) {
        self.ledger.append_with(
            iteration,
            ArtifactKind::CorrectedProgram,
            program.source(),
            EntryOptions::default().with_note(note),
        );
        self.current_program = Some(program.clone());
    }

    async fn execute(
        &mut self,
        program: AssembledProgram,
        artifact: ArtifactKind,
        draft: &mut RoundOutcome,
    ) -> Result<()> {
        let iteration = self.state.iteration;
        self.enter_phase(WorkflowPhase::Executing);
        draft.program = Some(program.source().to_string());

        let ctx = RunContext {
            session_id: self.session_id.clone(),
            iteration,
            artifact: artifact.as_str().to_string(),
        };
        self.metrics.inc_executions();
        let execution = self.runner.run_source(&program, &ctx).await?;

        self.record_execution_entry(iteration, &execution);
        obs::emit_execution_finished(&self.session_id, iteration, execution.success, execution.duration_ms);
        draft.summary = execution.summary();
        draft.execution = Some(execution);
        Ok(())
    }

    fn record_execution_entry(&mut self, iteration: u32, execution: &ExecutionResult) {
        let content = serde_json::to_string(execution)
            .unwrap_or_else(|_| execution.error_text().to_string());
        self.ledger
            .append(iteration, ArtifactKind::ExecutionResult, content);
    }

    /// Error log handed to the reviewer during correction.
    fn correction_log(&self, feedback: &str, program: &AssembledProgram) -> String {
        let chars = self.config.error_log_chars;
        let mut parts = Vec::new();
        if !feedback.trim().is_empty() {
            parts.push(format!("Manager feedback:\n{}", feedback.trim()));
        }
        let mut has_run_log = false;
        if let Some(exec) = &self.state.last_execution {
            if !exec.stdout.trim().is_empty() {
                parts.push(format!("Program output:\n{}", tail_excerpt(exec.stdout.trim_end(), chars)));
            }
            let error = exec.error.as_deref().unwrap_or(&exec.stderr);
            if !error.trim().is_empty() {
                has_run_log = true;
                parts.push(format!("Error output:\n{}", tail_excerpt(error.trim_end(), chars)));
            }
        }
        if !has_run_log {
            if let Some(diagnostic) = syntax_check(program.source()) {
                parts.push(diagnostic);
            }
        }
        parts.join("\n\n")
    }

    fn close_round(&mut self, outcome: RoundOutcome) {
        if let Some(execution) = &outcome.execution {
            self.state.record_execution(execution.clone());
        }
        info!(
            iteration = outcome.iteration,
            kind = %outcome.kind,
            success = outcome.succeeded(),
            "round finished"
        );
        self.rounds.push(outcome);
    }

    fn finish(&mut self, reason: TerminationReason) -> WorkflowOutcome {
        self.enter_phase(WorkflowPhase::Terminated);
        self.state.termination_reason = Some(reason);

        let last_execution = self.state.last_execution.clone();
        let success = final_success(reason, last_execution.as_ref());
        let error = if success {
            None
        } else {
            last_execution
                .as_ref()
                .map(|e| e.error_text().to_string())
                .filter(|e| !e.is_empty())
                .or_else(|| self.rounds.iter().rev().find_map(|r| r.error.clone()))
                .or_else(|| Some(format!("workflow ended with {reason}")))
        };

        obs::emit_workflow_finished(&self.session_id, reason.as_str(), self.state.iteration, success);
        self.metrics.flush(&self.session_id);

        WorkflowOutcome {
            session_id: self.session_id.clone(),
            success,
            termination_reason: reason,
            iterations: self.state.iteration,
            final_program: self.current_program.as_ref().map(|p| p.source().to_string()),
            last_execution,
            error,
            rounds: self.rounds.clone(),
            ledger: self.ledger.summary(),
            metrics: self.metrics.snapshot(),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("round panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("round panicked: {s}")
    } else {
        "round panicked".to_string()
    }
}
