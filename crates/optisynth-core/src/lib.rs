//! Optisynth Core Library
//!
//! Fragment assembly, sandboxed execution and the bounded repair loop that
//! turns collaborator output into a runnable optimization program.

pub mod assembler;
pub mod collaborator;
pub mod config;
pub mod decision;
pub mod domain;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod policy;
pub mod sandbox;
pub mod telemetry;
pub mod verdict;

pub use assembler::{
    syntax_check, Assembly, AssemblyWarning, FragmentAssembler, FragmentSplit, Placeholder,
    PlaceholderSite, Template,
};

pub use collaborator::{extract_code, Collaborator, CollaboratorError, CollaboratorRole};

pub use config::{GatewayConfig, OptisynthConfig, RoleProfile, WorkflowConfig};

pub use decision::{DecisionKind, ManagerDecision};

pub use domain::{AssembledProgram, ContentDigest, Fragment, OptisynthError, Result};

pub use ledger::{
    read_summary, write_summary, ArtifactKind, CodeLedger, LedgerEntry, LedgerSummary,
};

pub use metrics::{MetricsSnapshot, WorkflowMetrics};

pub use orchestrator::{
    Orchestrator, RoundKind, RoundOutcome, TerminationReason, WorkflowOutcome, WorkflowPhase,
    WorkflowState,
};

pub use policy::{
    CollaboratorPolicy, DecisionInput, DecisionPolicy, DecisionThresholds, RuleBasedPolicy,
};

pub use sandbox::{
    interpreter_available, ExecutionResult, ExecutionSandbox, ProgramRunner, RunContext,
    RunSummary, SandboxConfig, SandboxError,
};

pub use verdict::{Correction, ReviewStatus, ReviewVerdict};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
