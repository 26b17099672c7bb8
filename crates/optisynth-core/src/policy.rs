//! Decision policies: classify a round into one of the four decision kinds.
//!
//! [`RuleBasedPolicy`] is deterministic and total. [`CollaboratorPolicy`]
//! asks the manager collaborator and falls back to the rules whenever the
//! reply is unusable, so every policy always yields exactly one kind.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborator::{call_non_empty, prompts, Collaborator, CollaboratorRole};
use crate::decision::{DecisionKind, ManagerDecision};
use crate::domain::{OptisynthError, Result};
use crate::sandbox::{ExecutionResult, RunSummary};

/// Keep at most `max` characters from the end of `text`.
pub(crate) fn tail_excerpt(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let skip = count - max;
    let tail: String = text.chars().skip(skip).collect();
    format!("...{tail}")
}

/// Tunables for [`RuleBasedPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// Share of strategies that must succeed for a multi-strategy run to pass.
    pub min_strategy_success_ratio: f64,
    /// Objectives with a larger magnitude are treated as unreasonable.
    pub objective_magnitude_limit: f64,
    /// Iterations during which total strategy failure still earns a solver retry.
    pub early_retry_iterations: u32,
    /// Consecutive failed executions that end the workflow on its last round.
    pub failure_streak_limit: u32,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            min_strategy_success_ratio: 0.5,
            objective_magnitude_limit: 1e12,
            early_retry_iterations: 2,
            failure_streak_limit: 2,
        }
    }
}

impl DecisionThresholds {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_strategy_success_ratio) {
            return Err(OptisynthError::Config(
                "min_strategy_success_ratio must be within [0, 1]".into(),
            ));
        }
        if self.objective_magnitude_limit.is_nan() || self.objective_magnitude_limit <= 0.0 {
            return Err(OptisynthError::Config(
                "objective_magnitude_limit must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a policy may look at when classifying a round.
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    pub problem: String,
    /// Rounds completed so far.
    pub iteration: u32,
    pub max_iterations: u32,
    pub execution: Option<ExecutionResult>,
    pub summary: Option<RunSummary>,
    /// Failed executions in a row, ending with the latest one.
    pub consecutive_failures: u32,
}

impl DecisionInput {
    fn failed(&self) -> bool {
        !self.execution.as_ref().is_some_and(|e| e.success)
    }

    fn error_text(&self) -> &str {
        self.execution
            .as_ref()
            .map(ExecutionResult::error_text)
            .unwrap_or("no program was executed")
    }

    /// Plain-text report of the round for the manager collaborator.
    pub fn report(&self, error_chars: usize) -> String {
        let mut out = String::new();
        match &self.execution {
            Some(exec) => {
                out.push_str(&format!(
                    "success: {}\nduration_ms: {}\n",
                    exec.success, exec.duration_ms
                ));
                if !exec.success {
                    out.push_str(&format!(
                        "error:\n{}\n",
                        tail_excerpt(exec.error_text(), error_chars)
                    ));
                }
            }
            None => out.push_str("success: false\nerror: no program was executed\n"),
        }
        if let Some(summary) = &self.summary {
            if let Ok(json) = serde_json::to_string_pretty(summary) {
                out.push_str(&format!("summary:\n{json}\n"));
            }
        }
        out.push_str(&format!(
            "consecutive_failures: {}\n",
            self.consecutive_failures
        ));
        out
    }
}

#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn decide(&self, input: &DecisionInput) -> ManagerDecision;
}

/// Deterministic decision rules.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedPolicy {
    thresholds: DecisionThresholds,
}

impl RuleBasedPolicy {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    fn reasonable(&self, value: f64) -> bool {
        value.is_finite() && value.abs() <= self.thresholds.objective_magnitude_limit
    }

    /// Classify `input`. Total over all inputs.
    pub fn classify(&self, input: &DecisionInput) -> ManagerDecision {
        let t = &self.thresholds;

        if input.failed() {
            let last_round = input.iteration + 1 >= input.max_iterations;
            if last_round && input.consecutive_failures >= t.failure_streak_limit {
                return ManagerDecision::new(
                    DecisionKind::TerminateFailure,
                    format!(
                        "execution failed {} times in a row with the iteration budget exhausted",
                        input.consecutive_failures
                    ),
                )
                .with_next_action("stop and report the last error");
            }
            return ManagerDecision::new(DecisionKind::NeedCorrection, "execution failed")
                .with_next_action("review the latest program against the error log")
                .with_feedback(tail_excerpt(input.error_text(), 2000));
        }

        let Some(summary) = &input.summary else {
            return ManagerDecision::new(
                DecisionKind::TerminateSuccess,
                "program ran successfully without reporting a summary",
            );
        };

        if let Some(ratio) = summary.success_ratio() {
            let best = summary.best_strategy();
            if ratio >= t.min_strategy_success_ratio {
                if let Some((name, value)) = best.filter(|(_, v)| self.reasonable(*v)) {
                    return ManagerDecision::new(
                        DecisionKind::TerminateSuccess,
                        format!("{:.0}% of strategies succeeded; best is {name} at {value}", ratio * 100.0),
                    );
                }
            }
            let failed: Vec<&str> = summary
                .strategies
                .iter()
                .filter(|(_, s)| !s.succeeded())
                .map(|(name, _)| name.as_str())
                .collect();
            if ratio > 0.0 {
                return ManagerDecision::new(
                    DecisionKind::UpdateSolver,
                    format!("only {:.0}% of strategies produced a usable result", ratio * 100.0),
                )
                .with_next_action("regenerate the solver")
                .with_feedback(format!("fix or replace the failing strategies: {}", failed.join(", ")));
            }
            if input.iteration <= t.early_retry_iterations {
                return ManagerDecision::new(DecisionKind::UpdateSolver, "every strategy failed")
                    .with_next_action("regenerate the solver")
                    .with_feedback(format!("all strategies failed: {}", failed.join(", ")));
            }
            return ManagerDecision::new(
                DecisionKind::TerminateFailure,
                "every strategy failed after repeated solver regeneration",
            );
        }

        if let Some(value) = summary.objective {
            if !self.reasonable(value) {
                return ManagerDecision::new(
                    DecisionKind::UpdateSolver,
                    format!("objective {value} is not a reasonable value"),
                )
                .with_next_action("regenerate the solver")
                .with_feedback("the reported objective is non-finite or out of range; check bounds and penalty terms");
            }
        }
        if summary.converged == Some(false) {
            return ManagerDecision::new(DecisionKind::UpdateSolver, "search did not converge")
                .with_next_action("regenerate the solver")
                .with_feedback("increase iterations or change the search strategy so it converges");
        }

        ManagerDecision::new(
            DecisionKind::TerminateSuccess,
            match summary.objective {
                Some(v) => format!("objective {v} is finite and within range"),
                None => "program ran successfully".to_string(),
            },
        )
    }
}

#[async_trait]
impl DecisionPolicy for RuleBasedPolicy {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    async fn decide(&self, input: &DecisionInput) -> ManagerDecision {
        self.classify(input)
    }
}

/// Manager-collaborator policy with rule-based fallback.
pub struct CollaboratorPolicy {
    collaborator: Arc<dyn Collaborator>,
    fallback: RuleBasedPolicy,
    error_chars: usize,
}

impl CollaboratorPolicy {
    pub fn new(collaborator: Arc<dyn Collaborator>, thresholds: DecisionThresholds) -> Self {
        Self {
            collaborator,
            fallback: RuleBasedPolicy::new(thresholds),
            error_chars: 4000,
        }
    }

    /// Limit the error text included in manager prompts.
    pub fn with_error_chars(mut self, error_chars: usize) -> Self {
        self.error_chars = error_chars;
        self
    }

    async fn ask(&self, input: &DecisionInput) -> Result<ManagerDecision> {
        let prompt = prompts::manager_prompt(
            &input.problem,
            input.iteration,
            input.max_iterations,
            &input.report(self.error_chars),
        );
        let reply = call_non_empty(self.collaborator.as_ref(), CollaboratorRole::Manager, &prompt).await?;
        ManagerDecision::parse(&reply)
    }
}

#[async_trait]
impl DecisionPolicy for CollaboratorPolicy {
    fn name(&self) -> &'static str {
        "collaborator"
    }

    async fn decide(&self, input: &DecisionInput) -> ManagerDecision {
        match self.ask(input).await {
            Ok(decision) => {
                debug!(kind = %decision.kind, "manager decision parsed");
                decision
            }
            Err(e) => {
                warn!(error = %e, "manager decision unusable; applying rules");
                let mut decision = self.fallback.classify(input);
                decision.reason = format!("rule-based fallback ({e}): {}", decision.reason);
                decision
            }
        }
    }
}
