//! Conversation port: session-scoped exchange with the AI provider.
//!
//! The loop never talks to the provider directly: it opens a session, installs
//! a system prompt, adds user messages and tool results, and asks the
//! conversation layer for the next assistant turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::ConversationError;
use crate::message::Message;
use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One assistant turn: the message plus the raw tool calls it requested.
#[derive(Debug, Clone)]
pub struct Turn {
    pub message: Message,
    pub tool_calls: Vec<ToolCall>,
}

/// Session-oriented access to the AI provider.
///
/// Implementations must be safe for concurrent use by many runs; each run
/// only ever touches its own session.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Open a new session and return its id.
    async fn open_session(&self, ctx: &ExecutionContext) -> Result<SessionId, ConversationError>;

    /// Install (or replace) the session's system prompt.
    async fn set_system_prompt(
        &self,
        session: &SessionId,
        prompt: &str,
    ) -> Result<(), ConversationError>;

    /// Append a user message.
    async fn add_user_message(
        &self,
        session: &SessionId,
        text: &str,
    ) -> Result<Message, ConversationError>;

    /// Ask the provider for the next assistant turn.
    async fn next_turn(
        &self,
        ctx: &ExecutionContext,
        session: &SessionId,
    ) -> Result<Turn, ConversationError>;

    /// Feed a batch of tool results back, preserving order.
    async fn add_tool_results(
        &self,
        session: &SessionId,
        results: &[ToolResult],
    ) -> Result<(), ConversationError>;

    /// End the session and release its resources.
    async fn close_session(&self, session: &SessionId) -> Result<(), ConversationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn session_id_display() {
        let id = SessionId::from("s-1");
        assert_eq!(id.to_string(), "s-1");
        assert_eq!(id.as_str(), "s-1");
    }
}
