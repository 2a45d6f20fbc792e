//! Request-scoped execution context.
//!
//! An [`ExecutionContext`] is threaded through every call of a run. It carries
//! the cancellation token the loop honours, an optional deadline, the id of
//! the session the current loop is talking to and, when the run is a
//! delegated subtask, a typed [`SubagentContextInfo`] record.
//!
//! Contexts are cheap to clone. Deriving a child context (`child`) creates a
//! child cancellation token: cancelling the parent cancels the child, never
//! the other way around.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::conversation::SessionId;
use crate::error::PolicyError;

/// Correlation record attached to the context of a delegated subtask.
///
/// Absence of this record means "top-level run, depth 0".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubagentContextInfo {
    /// Id of the subagent run this context belongs to
    pub subagent_id: String,

    /// Session of the loop that delegated the task, if known
    pub parent_session_id: Option<String>,

    /// Always true for a record attached by the subagent runner
    pub is_subagent: bool,

    /// Nesting depth: 1 for a subagent launched from a top-level run
    pub depth: u32,
}

impl SubagentContextInfo {
    /// Build the record for a subagent launched from `parent`.
    ///
    /// Depth is the parent's depth plus one, or 1 if the parent carries no
    /// subagent record.
    pub fn nested_in(parent: &ExecutionContext, subagent_id: impl Into<String>) -> Self {
        Self {
            subagent_id: subagent_id.into(),
            parent_session_id: parent.session_id().map(|s| s.to_string()),
            is_subagent: true,
            depth: parent.subagent_depth() + 1,
        }
    }
}

/// Cancellable, request-scoped context for one run or one call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    session_id: Option<SessionId>,
    subagent: Option<SubagentContextInfo>,
}

impl ExecutionContext {
    /// A fresh, live context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context driven by an existing cancellation token.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..Self::default()
        }
    }

    /// Derive a child context whose token is cancelled with this one.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    /// Replace the cancellation token, keeping every other field.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Attach a deadline. An existing earlier deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Attach a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Record the session the current loop is talking to.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach a subagent correlation record.
    pub fn with_subagent(mut self, info: SubagentContextInfo) -> Self {
        self.subagent = Some(info);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn subagent(&self) -> Option<&SubagentContextInfo> {
        self.subagent.as_ref()
    }

    /// Recursion depth: 0 for a top-level run.
    pub fn subagent_depth(&self) -> u32 {
        self.subagent.as_ref().map_or(0, |info| info.depth)
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the deadline, if any, has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Liveness check: cancellation first, then the deadline.
    pub fn check(&self) -> std::result::Result<(), PolicyError> {
        if self.is_cancelled() {
            return Err(PolicyError::Cancelled);
        }
        if self.is_expired() {
            return Err(PolicyError::Timeout);
        }
        Ok(())
    }

    /// Resolves when this context is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Resolves when this context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}
