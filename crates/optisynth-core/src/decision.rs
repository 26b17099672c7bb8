//! Manager decision vocabulary and wire format.
//!
//! ```text
//! DECISION: TERMINATE_SUCCESS | TERMINATE_FAILURE | NEED_CORRECTION | UPDATE_SOLVER
//! REASON: free text
//! NEXT_ACTION: free text
//! FEEDBACK: free text
//! ```
//!
//! Fields may continue over following lines until the next label. A missing
//! or unrecognized `DECISION` is a [`OptisynthError::DecisionAmbiguity`].

use serde::{Deserialize, Serialize};

use crate::domain::{OptisynthError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    TerminateSuccess,
    TerminateFailure,
    NeedCorrection,
    UpdateSolver,
}

impl DecisionKind {
    pub const ALL: [DecisionKind; 4] = [
        DecisionKind::TerminateSuccess,
        DecisionKind::TerminateFailure,
        DecisionKind::NeedCorrection,
        DecisionKind::UpdateSolver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::TerminateSuccess => "TERMINATE_SUCCESS",
            DecisionKind::TerminateFailure => "TERMINATE_FAILURE",
            DecisionKind::NeedCorrection => "NEED_CORRECTION",
            DecisionKind::UpdateSolver => "UPDATE_SOLVER",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DecisionKind::TerminateSuccess | DecisionKind::TerminateFailure
        )
    }

    /// Whether this kind asks for another round of work.
    pub fn requests_work(&self) -> bool {
        matches!(self, DecisionKind::NeedCorrection | DecisionKind::UpdateSolver)
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionKind {
    type Err = OptisynthError;

    /// Accepts the exact token or text containing exactly one token.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        let cleaned = normalized.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_');
        if let Some(kind) = DecisionKind::ALL.into_iter().find(|k| k.as_str() == cleaned) {
            return Ok(kind);
        }
        let mentioned: Vec<DecisionKind> = DecisionKind::ALL
            .into_iter()
            .filter(|k| normalized.contains(k.as_str()))
            .collect();
        match mentioned.as_slice() {
            [only] => Ok(*only),
            [] => Err(OptisynthError::DecisionAmbiguity(format!(
                "unknown decision {:?}",
                s.trim()
            ))),
            _ => Err(OptisynthError::DecisionAmbiguity(format!(
                "decision names several kinds: {:?}",
                s.trim()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerDecision {
    pub kind: DecisionKind,
    pub reason: String,
    pub next_action: String,
    pub feedback: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Decision,
    Reason,
    NextAction,
    Feedback,
}

impl ManagerDecision {
    pub fn new(kind: DecisionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            next_action: String::new(),
            feedback: String::new(),
        }
    }

    pub fn with_next_action(mut self, next_action: impl Into<String>) -> Self {
        self.next_action = next_action.into();
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    /// Parse decision text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut decision: Option<String> = None;
        let mut reason = Vec::new();
        let mut next_action = Vec::new();
        let mut feedback = Vec::new();
        let mut current: Option<Field> = None;

        for line in text.lines() {
            let trimmed = line.trim().trim_start_matches(['*', '#', ' ', '-']);
            let labeled = trimmed.split_once(':').and_then(|(label, rest)| {
                let field = match label.trim().trim_end_matches('*') {
                    "DECISION" => Field::Decision,
                    "REASON" => Field::Reason,
                    "NEXT_ACTION" => Field::NextAction,
                    "FEEDBACK" => Field::Feedback,
                    _ => return None,
                };
                Some((field, rest.trim_start_matches('*').trim()))
            });

            let (field, content) = match labeled {
                Some((field, rest)) => {
                    current = Some(field);
                    (field, rest)
                }
                None => match current {
                    Some(field) if !trimmed.is_empty() => (field, line.trim()),
                    _ => continue,
                },
            };

            match field {
                Field::Decision => {
                    if decision.is_none() && !content.is_empty() {
                        decision = Some(content.to_string());
                    }
                }
                Field::Reason => reason.push(content.to_string()),
                Field::NextAction => next_action.push(content.to_string()),
                Field::Feedback => feedback.push(content.to_string()),
            }
        }

        let raw = decision.ok_or_else(|| {
            OptisynthError::DecisionAmbiguity("no DECISION field found".to_string())
        })?;
        let kind = raw.parse::<DecisionKind>()?;

        let join = |parts: Vec<String>| {
            parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(Self {
            kind,
            reason: join(reason),
            next_action: join(next_action),
            feedback: join(feedback),
        })
    }

    /// Render in wire format.
    pub fn to_wire(&self) -> String {
        format!(
            "DECISION: {}\nREASON: {}\nNEXT_ACTION: {}\nFEEDBACK: {}",
            self.kind, self.reason, self.next_action, self.feedback
        )
    }
}
