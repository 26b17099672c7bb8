//! Scripted collaborator for tests.
//!
//! Replies are queued per role. When a role's queue is empty its sticky
//! reply (if any) repeats; otherwise the call fails with
//! [`CollaboratorError::Exhausted`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{Collaborator, CollaboratorError, CollaboratorRole};

#[derive(Debug, Default)]
struct RoleScript {
    queue: VecDeque<Result<String, String>>,
    sticky: Option<String>,
}

/// Collaborator that replays per-role scripts and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedCollaborator {
    scripts: Mutex<HashMap<CollaboratorRole, RoleScript>>,
    prompts: Mutex<Vec<(CollaboratorRole, String)>>,
}

impl ScriptedCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, role: CollaboratorRole, f: impl FnOnce(&mut RoleScript)) {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        f(scripts.entry(role).or_default());
    }

    /// Queue one reply for `role`.
    pub fn with_reply(self, role: CollaboratorRole, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        self.script(role, |s| s.queue.push_back(Ok(reply)));
        self
    }

    /// Queue one unreachable fault for `role`.
    pub fn with_fault(self, role: CollaboratorRole, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.script(role, |s| s.queue.push_back(Err(reason)));
        self
    }

    /// Reply used for `role` whenever its queue is empty.
    pub fn with_sticky_reply(self, role: CollaboratorRole, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        self.script(role, |s| s.sticky = Some(reply));
        self
    }

    /// All prompts received, in call order.
    pub fn prompts(&self) -> Vec<(CollaboratorRole, String)> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Prompts received for one role.
    pub fn prompts_for(&self, role: CollaboratorRole) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, p)| p)
            .collect()
    }

    pub fn call_count(&self, role: CollaboratorRole) -> usize {
        self.prompts_for(role).len()
    }
}

#[async_trait]
impl Collaborator for ScriptedCollaborator {
    async fn call(&self, role: CollaboratorRole, prompt: &str) -> Result<String, CollaboratorError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((role, prompt.to_string()));

        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        let script = scripts.entry(role).or_default();
        match script.queue.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(CollaboratorError::Unreachable { role, reason }),
            None => script
                .sticky
                .clone()
                .ok_or(CollaboratorError::Exhausted { role }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_sticky_then_exhausted() {
        let collab = ScriptedCollaborator::new()
            .with_reply(CollaboratorRole::Solver, "first")
            .with_sticky_reply(CollaboratorRole::Solver, "again");
        assert_eq!(collab.call(CollaboratorRole::Solver, "a").await.unwrap(), "first");
        assert_eq!(collab.call(CollaboratorRole::Solver, "b").await.unwrap(), "again");
        assert_eq!(collab.call(CollaboratorRole::Solver, "c").await.unwrap(), "again");

        let err = collab.call(CollaboratorRole::Manager, "d").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Exhausted { .. }));
        assert_eq!(collab.call_count(CollaboratorRole::Solver), 3);
    }

    #[tokio::test]
    async fn test_fault_is_unreachable() {
        let collab = ScriptedCollaborator::new().with_fault(CollaboratorRole::Designer, "connection refused");
        let err = collab.call(CollaboratorRole::Designer, "p").await.unwrap_err();
        assert_eq!(err.role(), Some(CollaboratorRole::Designer));
        assert!(err.to_string().contains("connection refused"));
    }
}
