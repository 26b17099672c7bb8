//! Review verdict wire format.
//!
//! ```text
//! STATUS: PASS | NEEDS_MODIFICATION
//! ANALYSIS: free text
//! ISSUES: one per line, or "none"
//! SUGGESTIONS: one per line, or "none"
//! CORRECTED_<ARTIFACT>: replacement source (optionally fenced), or UNCHANGED
//! ```
//!
//! Parsing is fail-closed: text with no recognizable field is a
//! [`OptisynthError::ReviewParseFailure`], and [`ReviewVerdict::parse_or_default`]
//! maps that to a PASS verdict with no corrections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{OptisynthError, Result};

/// Artifact name used for whole-program corrections.
pub const COMPLETE_CODE: &str = "COMPLETE_CODE";

const EMPTY_LIST_SENTINELS: [&str; 5] = ["none", "n/a", "no issues", "no suggestions", "无"];
const UNCHANGED_SENTINELS: [&str; 6] = [
    "unchanged",
    "no_change",
    "no change",
    "no changes",
    "none",
    "无需修改",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pass,
    NeedsModification,
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewStatus::Pass => write!(f, "PASS"),
            ReviewStatus::NeedsModification => write!(f, "NEEDS_MODIFICATION"),
        }
    }
}

/// Replacement for one artifact, or the explicit "no change" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum Correction {
    Unchanged,
    Replacement(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub status: ReviewStatus,
    pub analysis: String,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub corrections: BTreeMap<String, Correction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Section {
    Analysis,
    Issues,
    Suggestions,
    Corrected(String),
    Ignored,
}

fn label_of(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim().trim_start_matches(['*', '#', ' ']);
    let (label, rest) = trimmed.split_once(':')?;
    let label = label.trim().trim_end_matches('*');
    if label.is_empty() || !label.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
        return None;
    }
    Some((label, rest.trim_start_matches('*').trim()))
}

fn strip_bullet(item: &str) -> &str {
    let item = item.trim();
    if let Some(rest) = item.strip_prefix("- ").or_else(|| item.strip_prefix("* ")) {
        return rest.trim();
    }
    let digits = item.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &item[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    item
}

fn is_sentinel(text: &str, sentinels: &[&str]) -> bool {
    let t = text
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '[' || c == ']' || c == '.');
    sentinels.iter().any(|s| t.eq_ignore_ascii_case(s))
}

fn parse_status(value: &str) -> Option<ReviewStatus> {
    let v = value.to_ascii_uppercase().replace([' ', '-'], "_");
    if v.contains("NEEDS_MODIFICATION") {
        Some(ReviewStatus::NeedsModification)
    } else if v.contains("PASS") {
        Some(ReviewStatus::Pass)
    } else {
        None
    }
}

impl ReviewVerdict {
    /// A clean PASS with no findings.
    pub fn pass() -> Self {
        Self {
            status: ReviewStatus::Pass,
            analysis: String::new(),
            issues: Vec::new(),
            suggestions: Vec::new(),
            corrections: BTreeMap::new(),
        }
    }

    /// Parse verdict text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut status = None;
        let mut recognized = false;
        let mut analysis: Vec<String> = Vec::new();
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        let mut corrected: BTreeMap<String, Vec<String>> = BTreeMap::new();

        let mut section = Section::Ignored;
        let mut in_fence = false;

        for line in text.lines() {
            let in_corrected = matches!(section, Section::Corrected(_));
            if in_corrected && line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                continue;
            }

            let label = if in_fence { None } else { label_of(line) };
            if let Some((label, rest)) = label {
                let next = match label {
                    "STATUS" | "REVIEW_STATUS" => {
                        status = parse_status(rest);
                        Some(Section::Ignored)
                    }
                    "ANALYSIS" => Some(Section::Analysis),
                    "ISSUES" => Some(Section::Issues),
                    "SUGGESTIONS" => Some(Section::Suggestions),
                    "COMMENTS" => Some(Section::Ignored),
                    other => other
                        .strip_prefix("CORRECTED_")
                        .filter(|name| !name.is_empty())
                        .map(|name| Section::Corrected(name.to_string())),
                };
                if let Some(next) = next {
                    recognized = true;
                    section = next;
                    in_fence = false;
                    if let Section::Corrected(name) = &section {
                        corrected.entry(name.clone()).or_default();
                    }
                    if !rest.is_empty() {
                        Self::push_line(
                            &section,
                            rest,
                            &mut analysis,
                            &mut issues,
                            &mut suggestions,
                            &mut corrected,
                        );
                    }
                    continue;
                }
            }

            Self::push_line(
                &section,
                line,
                &mut analysis,
                &mut issues,
                &mut suggestions,
                &mut corrected,
            );
        }

        if !recognized {
            return Err(OptisynthError::ReviewParseFailure(
                "no verdict fields found".to_string(),
            ));
        }

        let corrections = corrected
            .into_iter()
            .map(|(name, lines)| {
                let source = lines.join("\n");
                let source = source.trim_matches('\n').trim_end();
                let correction = if source.trim().is_empty() || is_sentinel(source, &UNCHANGED_SENTINELS) {
                    Correction::Unchanged
                } else {
                    Correction::Replacement(source.to_string())
                };
                (name, correction)
            })
            .collect();

        let status = status.unwrap_or(if issues.is_empty() {
            ReviewStatus::Pass
        } else {
            ReviewStatus::NeedsModification
        });

        Ok(Self {
            status,
            analysis: analysis.join("\n").trim().to_string(),
            issues,
            suggestions,
            corrections,
        })
    }

    fn push_line(
        section: &Section,
        line: &str,
        analysis: &mut Vec<String>,
        issues: &mut Vec<String>,
        suggestions: &mut Vec<String>,
        corrected: &mut BTreeMap<String, Vec<String>>,
    ) {
        match section {
            Section::Analysis => {
                if !line.trim().is_empty() {
                    analysis.push(line.trim().to_string());
                }
            }
            Section::Issues | Section::Suggestions => {
                let item = strip_bullet(line);
                if item.is_empty() || is_sentinel(item, &EMPTY_LIST_SENTINELS) {
                    return;
                }
                let list = if *section == Section::Issues {
                    issues
                } else {
                    suggestions
                };
                list.push(item.to_string());
            }
            Section::Corrected(name) => {
                corrected.entry(name.clone()).or_default().push(line.to_string());
            }
            Section::Ignored => {}
        }
    }

    /// Parse, falling back to a PASS verdict with no corrections.
    pub fn parse_or_default(text: &str) -> Self {
        Self::parse(text).unwrap_or_else(|e| {
            warn!(error = %e, "review verdict unreadable; treating as PASS");
            Self::pass()
        })
    }

    pub fn needs_modification(&self) -> bool {
        self.status == ReviewStatus::NeedsModification
    }

    /// Replacement source for `artifact`, if the reviewer supplied one.
    pub fn replacement(&self, artifact: &str) -> Option<&str> {
        match self.corrections.get(artifact) {
            Some(Correction::Replacement(source)) => Some(source),
            _ => None,
        }
    }

    /// Replacement for the whole program.
    pub fn corrected_program(&self) -> Option<&str> {
        self.replacement(COMPLETE_CODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_verdict_with_fenced_correction() {
        let text = "STATUS: NEEDS_MODIFICATION\n\
                    ANALYSIS: Missing import.\n\
                    ISSUES:\n- numpy not imported\n- bad indent\n\
                    SUGGESTIONS: none\n\
                    CORRECTED_COMPLETE_CODE:\n```python\nimport numpy as np\n\ndef f():\n    return np.pi\n```\n";
        let v = ReviewVerdict::parse(text).unwrap();
        assert!(v.needs_modification());
        assert_eq!(v.analysis, "Missing import.");
        assert_eq!(v.issues, vec!["numpy not imported", "bad indent"]);
        assert!(v.suggestions.is_empty());
        assert_eq!(
            v.corrected_program(),
            Some("import numpy as np\n\ndef f():\n    return np.pi")
        );
    }

    #[test]
    fn test_unchanged_sentinel() {
        let v = ReviewVerdict::parse("STATUS: PASS\nCORRECTED_COMPLETE_CODE: UNCHANGED").unwrap();
        assert_eq!(v.status, ReviewStatus::Pass);
        assert_eq!(v.corrections.get(COMPLETE_CODE), Some(&Correction::Unchanged));
        assert!(v.corrected_program().is_none());
    }

    #[test]
    fn test_review_status_alias_and_labels_inside_fence() {
        let text = "REVIEW_STATUS: [NEEDS_MODIFICATION]\nCORRECTED_SOLVER_CODE:\n```\nSTATUS: PASS\nx = 1\n```";
        let v = ReviewVerdict::parse(text).unwrap();
        assert!(v.needs_modification());
        assert_eq!(v.replacement("SOLVER_CODE"), Some("STATUS: PASS\nx = 1"));
    }

    #[test]
    fn test_status_inferred_from_issues() {
        let v = ReviewVerdict::parse("ISSUES:\n1. loop never ends").unwrap();
        assert!(v.needs_modification());
        assert_eq!(v.issues, vec!["loop never ends"]);
    }

    #[test]
    fn test_unparseable_text_fails_closed() {
        let err = ReviewVerdict::parse("looks fine to me!").unwrap_err();
        assert!(matches!(err, OptisynthError::ReviewParseFailure(_)));
        let v = ReviewVerdict::parse_or_default("looks fine to me!");
        assert_eq!(v, ReviewVerdict::pass());
    }

    #[test]
    fn test_unfenced_correction_keeps_indentation() {
        let text = "STATUS: NEEDS_MODIFICATION\nCORRECTED_COMPLETE_CODE:\ndef f():\n    return 1\n";
        let v = ReviewVerdict::parse(text).unwrap();
        assert_eq!(v.corrected_program(), Some("def f():\n    return 1"));
    }
}
