//! Collaborator contract: role name plus prompt in, text out.
//!
//! The orchestrator treats every collaborator as a pure function. Transport,
//! retries and model selection belong to implementations such as the HTTP
//! gateway; the in-crate [`fakes`] replay scripted replies.

pub mod fakes;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The four collaborator roles of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorRole {
    Designer,
    Solver,
    Reviewer,
    Manager,
}

impl CollaboratorRole {
    pub const ALL: [CollaboratorRole; 4] = [
        CollaboratorRole::Designer,
        CollaboratorRole::Solver,
        CollaboratorRole::Reviewer,
        CollaboratorRole::Manager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorRole::Designer => "designer",
            CollaboratorRole::Solver => "solver",
            CollaboratorRole::Reviewer => "reviewer",
            CollaboratorRole::Manager => "manager",
        }
    }
}

impl std::fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CollaboratorRole {
    type Err = CollaboratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollaboratorRole::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CollaboratorError::UnknownRole(s.to_string()))
    }
}

/// Errors raised by collaborator implementations.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator {role} is unreachable: {reason}")]
    Unreachable {
        role: CollaboratorRole,
        reason: String,
    },

    #[error("collaborator {role} returned an empty reply")]
    EmptyReply { role: CollaboratorRole },

    #[error("collaborator {role} has no scripted reply left")]
    Exhausted { role: CollaboratorRole },

    #[error("unknown collaborator role: {0}")]
    UnknownRole(String),
}

impl CollaboratorError {
    pub fn role(&self) -> Option<CollaboratorRole> {
        match self {
            Self::Unreachable { role, .. } | Self::EmptyReply { role } | Self::Exhausted { role } => {
                Some(*role)
            }
            Self::UnknownRole(_) => None,
        }
    }
}

/// Uniform call contract for the external generation service.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn call(&self, role: CollaboratorRole, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Call `collaborator` and reject blank replies.
pub async fn call_non_empty(
    collaborator: &dyn Collaborator,
    role: CollaboratorRole,
    prompt: &str,
) -> Result<String, CollaboratorError> {
    let reply = collaborator.call(role, prompt).await?;
    if reply.trim().is_empty() {
        return Err(CollaboratorError::EmptyReply { role });
    }
    Ok(reply)
}

/// Pull the contents of fenced code blocks out of a reply.
///
/// All fenced blocks are concatenated in order with the fences (and any
/// language tag) removed. A reply without fences is returned trimmed; an
/// unterminated fence runs to the end of the reply.
pub fn extract_code(reply: &str) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in reply.lines() {
        let fence = line.trim_start().starts_with("```");
        match current.as_mut() {
            Some(block) if fence => {
                blocks.push(block.join("\n"));
                current = None;
            }
            Some(block) => block.push(line),
            None if fence => current = Some(Vec::new()),
            None => {}
        }
    }
    if let Some(block) = current {
        blocks.push(block.join("\n"));
    }

    if blocks.is_empty() {
        reply.trim().to_string()
    } else {
        blocks.join("\n\n").trim_matches('\n').to_string()
    }
}
