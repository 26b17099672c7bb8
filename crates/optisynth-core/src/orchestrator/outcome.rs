//! Per-round records and the final workflow result.

use serde::{Deserialize, Serialize};

use super::state::TerminationReason;
use crate::assembler::AssemblyWarning;
use crate::decision::ManagerDecision;
use crate::ledger::LedgerSummary;
use crate::metrics::MetricsSnapshot;
use crate::sandbox::{ExecutionResult, RunSummary};
use crate::verdict::ReviewVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    /// Designer, solver, assembly, review and execution.
    Initial,
    /// Full-program correction by the reviewer.
    Correction,
    /// Solver regenerated and program reassembled.
    Regeneration,
    /// Reviewer found nothing to change; the same program ran again.
    Reconfirm,
}

impl RoundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundKind::Initial => "initial",
            RoundKind::Correction => "correction",
            RoundKind::Regeneration => "regeneration",
            RoundKind::Reconfirm => "reconfirm",
        }
    }
}

impl std::fmt::Display for RoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub iteration: u32,
    pub kind: RoundKind,
    /// Decision that started this round; `None` for the first round.
    pub decision: Option<ManagerDecision>,
    /// Program executed in this round.
    pub program: Option<String>,
    pub review: Option<ReviewVerdict>,
    pub execution: Option<ExecutionResult>,
    pub summary: Option<RunSummary>,
    pub warnings: Vec<AssemblyWarning>,
    /// Fault caught at the round boundary.
    pub error: Option<String>,
}

impl RoundOutcome {
    pub(crate) fn new(iteration: u32, kind: RoundKind, decision: Option<ManagerDecision>) -> Self {
        Self {
            iteration,
            kind,
            decision,
            program: None,
            review: None,
            execution: None,
            summary: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.execution.as_ref().is_some_and(|e| e.success)
    }
}

/// Final result of [`super::Orchestrator::solve`]. Always produced, even
/// when every round failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub session_id: String,
    pub success: bool,
    pub termination_reason: TerminationReason,
    /// Rounds run, the first included.
    pub iterations: u32,
    pub final_program: Option<String>,
    pub last_execution: Option<ExecutionResult>,
    /// Last captured error text when unsuccessful.
    pub error: Option<String>,
    pub rounds: Vec<RoundOutcome>,
    pub ledger: LedgerSummary,
    pub metrics: MetricsSnapshot,
}
