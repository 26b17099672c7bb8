//! Fragment and assembled-program value types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::digest::ContentDigest;

/// Named text produced by a collaborator, targeted at one template placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Placeholder name without the `{{INSERT_..}}` decoration.
    pub placeholder: String,
    pub text: String,
}

impl Fragment {
    pub fn new(placeholder: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            text: text.into(),
        }
    }

    /// Blank or whitespace-only fragments resolve to an empty replacement.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Fully spliced program text, ready for execution.
///
/// Never edited in place: a corrected or regenerated program is a new value
/// and a new ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssembledProgram(String);

impl AssembledProgram {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn source(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn digest(&self) -> ContentDigest {
        ContentDigest::from_text(&self.0)
    }

    pub fn into_source(self) -> String {
        self.0
    }
}

impl fmt::Display for AssembledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
