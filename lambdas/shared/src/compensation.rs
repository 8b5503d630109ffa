//! Compensating actions for multi-step provisioning
//!
//! Each step that creates something remote pushes the action that undoes it.
//! When a later step fails the stack is unwound newest-first.

use async_trait::async_trait;
use tracing::{error, info};

use crate::errors::Result;

/// Remote side effect that can be undone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    /// Remove a GitHub webhook created for a new repository
    DeleteWebhook {
        owner: String,
        repo: String,
        hook_id: u64,
    },
    /// Remove a CodeCommit repository that failed to initialize
    DeleteRepository { name: String },
}

/// Executes undo actions against the service that owns them
#[async_trait]
pub trait Compensate: Send + Sync {
    async fn compensate(&self, action: &UndoAction) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct CompensationStack {
    actions: Vec<UndoAction>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: UndoAction) {
        self.actions.push(action);
    }

    /// Run every undo action newest-first; returns the number that failed
    ///
    /// A failing action does not stop the remaining ones.
    pub async fn unwind(self, target: &dyn Compensate) -> usize {
        let mut failures = 0;
        for action in self.actions.iter().rev() {
            match target.compensate(action).await {
                Ok(()) => info!(action = ?action, "Rolled back"),
                Err(e) => {
                    failures += 1;
                    error!(action = ?action, error = %e, "Rollback failed");
                }
            }
        }
        failures
    }
}
