//! Append-only code ledger.
//!
//! Every fragment, program, execution result, verdict and decision produced
//! by a workflow is appended here keyed by iteration and artifact kind.
//! Entries are never rewritten. The exported [`LedgerSummary`] carries
//! counts and lengths only, never content.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ContentDigest, OptisynthError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    DesignerFragment,
    SolverFragment,
    AssembledProgram,
    CorrectedProgram,
    ExecutionResult,
    ReviewVerdict,
    ManagerDecision,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::DesignerFragment => "designer_fragment",
            ArtifactKind::SolverFragment => "solver_fragment",
            ArtifactKind::AssembledProgram => "assembled_program",
            ArtifactKind::CorrectedProgram => "corrected_program",
            ArtifactKind::ExecutionResult => "execution_result",
            ArtifactKind::ReviewVerdict => "review_verdict",
            ArtifactKind::ManagerDecision => "manager_decision",
        }
    }

    /// Whether entries of this kind hold runnable program text.
    pub fn is_program(&self) -> bool {
        matches!(
            self,
            ArtifactKind::AssembledProgram | ArtifactKind::CorrectedProgram
        )
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the ledger, starting at 0.
    pub seq: u64,
    pub iteration: u32,
    pub kind: ArtifactKind,
    pub content: String,
    pub digest: ContentDigest,
    pub recorded_at: DateTime<Utc>,
    /// Produced by regeneration rather than the initial collaboration.
    pub regenerated: bool,
    /// Manager feedback or correction type that led to this entry.
    pub note: Option<String>,
}

impl LedgerEntry {
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Builder-style options for [`CodeLedger::append_with`].
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub regenerated: bool,
    pub note: Option<String>,
}

impl EntryOptions {
    pub fn regenerated() -> Self {
        Self {
            regenerated: true,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.note = (!note.trim().is_empty()).then_some(note);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CodeLedger {
    session_id: String,
    entries: Vec<LedgerEntry>,
}

impl CodeLedger {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn append(&mut self, iteration: u32, kind: ArtifactKind, content: impl Into<String>) -> u64 {
        self.append_with(iteration, kind, content, EntryOptions::default())
    }

    pub fn append_with(
        &mut self,
        iteration: u32,
        kind: ArtifactKind,
        content: impl Into<String>,
        options: EntryOptions,
    ) -> u64 {
        let content = content.into();
        let seq = self.entries.len() as u64;
        self.entries.push(LedgerEntry {
            seq,
            iteration,
            kind,
            digest: ContentDigest::from_text(&content),
            content,
            recorded_at: Utc::now(),
            regenerated: options.regenerated,
            note: options.note,
        });
        seq
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &LedgerEntry> + '_ {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Latest entry recorded under `(iteration, kind)`.
    pub fn at(&self, iteration: u32, kind: ArtifactKind) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.iteration == iteration && e.kind == kind)
    }

    pub fn latest(&self, kind: ArtifactKind) -> Option<&LedgerEntry> {
        self.entries.iter().rev().find(|e| e.kind == kind)
    }

    /// Most recent assembled or corrected program.
    pub fn latest_program(&self) -> Option<&LedgerEntry> {
        self.entries.iter().rev().find(|e| e.kind.is_program())
    }

    /// Program in effect at the end of `iteration`, for rollback.
    pub fn program_at(&self, iteration: u32) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.iteration <= iteration && e.kind.is_program())
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut categories: BTreeMap<ArtifactKind, CategorySummary> = BTreeMap::new();
        for entry in &self.entries {
            let category = categories.entry(entry.kind).or_default();
            category.count += 1;
            category.total_length += entry.len();
            category.entries.push(EntrySummary {
                seq: entry.seq,
                iteration: entry.iteration,
                length: entry.len(),
                recorded_at: entry.recorded_at,
                regenerated: entry.regenerated,
            });
        }
        LedgerSummary {
            session_id: self.session_id.clone(),
            generated_at: Utc::now(),
            total_entries: self.entries.len(),
            categories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub seq: u64,
    pub iteration: u32,
    pub length: usize,
    pub recorded_at: DateTime<Utc>,
    pub regenerated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub count: usize,
    pub total_length: usize,
    pub entries: Vec<EntrySummary>,
}

/// Audit export of a ledger: per-category counts and lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    pub total_entries: usize,
    pub categories: BTreeMap<ArtifactKind, CategorySummary>,
}

impl LedgerSummary {
    pub fn count(&self, kind: ArtifactKind) -> usize {
        self.categories.get(&kind).map_or(0, |c| c.count)
    }
}

const SUMMARY_FILE: &str = "ledger_summary.json";
const DIGEST_FILE: &str = "ledger_summary.digest";

/// Persist `<dir>/<session_id>/ledger_summary.json` plus its digest.
pub fn write_summary(summary: &LedgerSummary, dir: &Path) -> Result<PathBuf> {
    let session_dir = dir.join(&summary.session_id);
    std::fs::create_dir_all(&session_dir)?;

    let summary_path = session_dir.join(SUMMARY_FILE);
    let json = serde_json::to_vec_pretty(summary)?;
    let digest = ContentDigest::from_bytes(&json);

    std::fs::write(&summary_path, &json)?;
    std::fs::write(session_dir.join(DIGEST_FILE), digest.as_str().as_bytes())?;

    Ok(summary_path)
}

/// Read and verify `<dir>/<session_id>/ledger_summary.json`.
pub fn read_summary(session_id: &str, dir: &Path) -> Result<LedgerSummary> {
    let session_dir = dir.join(session_id);
    let json = std::fs::read(session_dir.join(SUMMARY_FILE))?;
    let expected = std::fs::read_to_string(session_dir.join(DIGEST_FILE))?;
    let actual = ContentDigest::from_bytes(&json);
    if expected.trim() != actual.as_str() {
        return Err(OptisynthError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual: actual.as_str().to_string(),
        });
    }
    Ok(serde_json::from_slice(&json)?)
}
