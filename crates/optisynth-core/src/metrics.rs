//! Per-workflow atomic counters.
//!
//! Each orchestrator owns its own [`WorkflowMetrics`]; there is no
//! process-wide instance. [`WorkflowMetrics::flush`] emits the current
//! values as one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    rounds: AtomicU64,
    executions: AtomicU64,
    structural_fallbacks: AtomicU64,
    corrections: AtomicU64,
    regenerations: AtomicU64,
    faults: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub rounds: u64,
    pub executions: u64,
    pub structural_fallbacks: u64,
    pub corrections: u64,
    pub regenerations: u64,
    pub faults: u64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_rounds(&self) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rounds", "counter incremented");
    }

    pub fn inc_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "executions", "counter incremented");
    }

    pub fn add_structural_fallbacks(&self, n: u64) {
        if n > 0 {
            self.structural_fallbacks.fetch_add(n, Ordering::Relaxed);
            tracing::trace!(metric = "structural_fallbacks", "counter incremented");
        }
    }

    pub fn inc_corrections(&self) {
        self.corrections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "corrections", "counter incremented");
    }

    pub fn inc_regenerations(&self) {
        self.regenerations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "regenerations", "counter incremented");
    }

    pub fn inc_faults(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "faults", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds: self.rounds.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            structural_fallbacks: self.structural_fallbacks.load(Ordering::Relaxed),
            corrections: self.corrections.load(Ordering::Relaxed),
            regenerations: self.regenerations.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self, session_id: &str) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            session_id = %session_id,
            rounds = s.rounds,
            executions = s.executions,
            structural_fallbacks = s.structural_fallbacks,
            corrections = s.corrections,
            regenerations = s.regenerations,
            faults = s.faults,
        );
    }
}
