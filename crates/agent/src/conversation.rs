//! Conversation sessions backed by a [`Provider`].
//!
//! Each session is a transcript held in memory. A turn sends the whole
//! transcript with the advertised tools to the provider's active model and
//! appends the reply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;
use vigil_core::context::ExecutionContext;
use vigil_core::conversation::{ConversationService, SessionId, Turn};
use vigil_core::error::ConversationError;
use vigil_core::message::{Conversation, Message};
use vigil_core::provider::{Provider, ProviderRequest, ToolDefinition};
use vigil_core::tool::{ToolCall, ToolResult};

pub struct ProviderConversationService {
    provider: Arc<dyn Provider>,
    tools: Vec<ToolDefinition>,
    temperature: f32,
    max_tokens: Option<u32>,
    sessions: Mutex<HashMap<SessionId, Conversation>>,
}

impl ProviderConversationService {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            tools: Vec::new(),
            temperature: 0.2,
            max_tokens: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Tools advertised to the model on every turn.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Number of open sessions.
    pub fn open_sessions(&self) -> usize {
        self.lock().len()
    }

    /// A copy of a session's transcript.
    pub fn transcript(&self, session: &SessionId) -> Option<Conversation> {
        self.lock().get(session).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Conversation>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(
        &self,
        session: &SessionId,
        f: impl FnOnce(&mut Conversation) -> T,
    ) -> Result<T, ConversationError> {
        let mut sessions = self.lock();
        let conversation = sessions
            .get_mut(session)
            .ok_or_else(|| ConversationError::SessionNotFound(session.to_string()))?;
        Ok(f(conversation))
    }
}

#[async_trait]
impl ConversationService for ProviderConversationService {
    async fn open_session(&self, ctx: &ExecutionContext) -> Result<SessionId, ConversationError> {
        if ctx.is_cancelled() {
            return Err(ConversationError::OpenFailed("context cancelled".into()));
        }
        let id = SessionId::new();
        self.lock().insert(id.clone(), Conversation::with_id(id.clone()));
        debug!(session = %id, "Session opened");
        Ok(id)
    }

    async fn set_system_prompt(
        &self,
        session: &SessionId,
        prompt: &str,
    ) -> Result<(), ConversationError> {
        self.with_session(session, |c| c.set_system_prompt(prompt))
    }

    async fn add_user_message(
        &self,
        session: &SessionId,
        text: &str,
    ) -> Result<Message, ConversationError> {
        let message = Message::user(text);
        self.with_session(session, |c| c.push(message.clone()))?;
        Ok(message)
    }

    async fn next_turn(
        &self,
        ctx: &ExecutionContext,
        session: &SessionId,
    ) -> Result<Turn, ConversationError> {
        let messages = self.with_session(session, |c| c.messages.clone())?;
        let request = ProviderRequest {
            model: self.provider.active_model(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.clone(),
        };

        let response = tokio::select! {
            response = self.provider.complete(request) => response
                .map_err(|e| ConversationError::CompletionFailed(e.to_string()))?,
            _ = ctx.done() => {
                return Err(ConversationError::CompletionFailed("context cancelled".into()));
            }
        };

        debug!(
            session = %session,
            model = %response.model,
            tool_calls = response.message.tool_calls.len(),
            "Turn received"
        );

        let tool_calls = response
            .message
            .tool_calls
            .iter()
            .map(|tc| {
                ToolCall::new(
                    &tc.id,
                    &tc.name,
                    serde_json::from_str(&tc.arguments).unwrap_or_default(),
                )
            })
            .collect();

        let message = response.message;
        self.with_session(session, |c| c.push(message.clone()))?;
        Ok(Turn {
            message,
            tool_calls,
        })
    }

    async fn add_tool_results(
        &self,
        session: &SessionId,
        results: &[ToolResult],
    ) -> Result<(), ConversationError> {
        self.with_session(session, |c| {
            for result in results {
                c.push(Message::tool_result(&result.call_id, &result.output));
            }
        })
    }

    async fn close_session(&self, session: &SessionId) -> Result<(), ConversationError> {
        match self.lock().remove(session) {
            Some(_) => {
                debug!(session = %session, "Session closed");
                Ok(())
            }
            None => Err(ConversationError::SessionNotFound(session.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text_response, tool_response};
    use serde_json::json;
    use vigil_core::message::Role;

    #[tokio::test]
    async fn turn_parses_tool_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response(
            "checking",
            vec![("c1", "bash", json!({"command": "df -h"}))],
        )]));
        let service = ProviderConversationService::new(provider.clone());
        let ctx = ExecutionContext::new();

        let session = service.open_session(&ctx).await.unwrap();
        service.set_system_prompt(&session, "system").await.unwrap();
        service.add_user_message(&session, "go").await.unwrap();

        let turn = service.next_turn(&ctx, &session).await.unwrap();
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].command(), Some("df -h"));

        let requests = provider.requests();
        assert_eq!(requests[0].model, "base-model");
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn tool_results_and_system_prompt_replacement() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("ok")]));
        let service = ProviderConversationService::new(provider);
        let ctx = ExecutionContext::new();
        let session = service.open_session(&ctx).await.unwrap();

        service.set_system_prompt(&session, "first").await.unwrap();
        service.set_system_prompt(&session, "second").await.unwrap();
        let call = ToolCall::new("c1", "bash", json!({}));
        service
            .add_tool_results(&session, &[ToolResult::success(&call, "out")])
            .await
            .unwrap();

        let transcript = service.transcript(&session).unwrap();
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(transcript.messages[0].content, "second");
        assert_eq!(transcript.messages[1].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let service = ProviderConversationService::new(provider);
        let missing = SessionId::from("missing");
        assert!(matches!(
            service.add_user_message(&missing, "hi").await,
            Err(ConversationError::SessionNotFound(_))
        ));
        assert!(service.close_session(&missing).await.is_err());
    }

    #[tokio::test]
    async fn close_removes_session() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let service = ProviderConversationService::new(provider);
        let session = service.open_session(&ExecutionContext::new()).await.unwrap();
        assert_eq!(service.open_sessions(), 1);
        service.close_session(&session).await.unwrap();
        assert_eq!(service.open_sessions(), 0);
    }
}
