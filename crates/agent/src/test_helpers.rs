//! Scripted collaborators shared by the agent tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use vigil_core::context::ExecutionContext;
use vigil_core::conversation::{ConversationService, SessionId, Turn};
use vigil_core::error::{ConversationError, ProviderError, ToolError};
use vigil_core::message::{Message, MessageToolCall};
use vigil_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use vigil_core::tool::{ToolCall, ToolExecutor, ToolResult};

// --- Provider ---

/// Returns queued responses in order, then plain "done" text.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    model: Mutex<String>,
    switches: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            model: Mutex::new("base-model".into()),
            switches: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Every model passed to `set_active_model`, in order.
    pub fn switches(&self) -> Vec<String> {
        self.switches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let mut response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| text_response("done"));
        response.model = model;
        Ok(response)
    }

    fn active_model(&self) -> String {
        self.model.lock().unwrap().clone()
    }

    fn set_active_model(&self, model: &str) -> Result<(), ProviderError> {
        self.switches.lock().unwrap().push(model.to_string());
        *self.model.lock().unwrap() = model.to_string();
        Ok(())
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        model: "base-model".into(),
    }
}

pub fn tool_response(text: &str, calls: Vec<(&str, &str, Value)>) -> ProviderResponse {
    let mut message = Message::assistant(text);
    message.tool_calls = calls
        .into_iter()
        .map(|(id, name, args)| MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args.to_string(),
        })
        .collect();
    ProviderResponse {
        message,
        model: "base-model".into(),
    }
}

// --- Conversation ---

/// A conversation service that replays scripted turns.
///
/// Once the script runs out it answers "done" without tool calls, or, in
/// hanging mode, waits for the context to be cancelled or to expire.
#[derive(Default)]
pub struct ScriptedConversation {
    turns: Mutex<VecDeque<Turn>>,
    hang_when_empty: AtomicBool,
    fail_open: AtomicBool,
    fail_system_prompt: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
    turns_requested: AtomicUsize,
    system_prompts: Mutex<Vec<String>>,
    user_messages: Mutex<Vec<String>>,
    result_batches: Mutex<Vec<Vec<ToolResult>>>,
}

impl ScriptedConversation {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            ..Self::default()
        }
    }

    /// Block in `next_turn` until the context is done once the script is spent.
    pub fn hanging(self) -> Self {
        self.hang_when_empty.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_open(self) -> Self {
        self.fail_open.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_system_prompt(self) -> Self {
        self.fail_system_prompt.store(true, Ordering::SeqCst);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn turns_requested(&self) -> usize {
        self.turns_requested.load(Ordering::SeqCst)
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.system_prompts.lock().unwrap().clone()
    }

    pub fn user_messages(&self) -> Vec<String> {
        self.user_messages.lock().unwrap().clone()
    }

    pub fn result_batches(&self) -> Vec<Vec<ToolResult>> {
        self.result_batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationService for ScriptedConversation {
    async fn open_session(&self, _ctx: &ExecutionContext) -> Result<SessionId, ConversationError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ConversationError::OpenFailed("scripted failure".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(SessionId::new())
    }

    async fn set_system_prompt(
        &self,
        _session: &SessionId,
        prompt: &str,
    ) -> Result<(), ConversationError> {
        if self.fail_system_prompt.load(Ordering::SeqCst) {
            return Err(ConversationError::Backend("scripted failure".into()));
        }
        self.system_prompts.lock().unwrap().push(prompt.to_string());
        Ok(())
    }

    async fn add_user_message(
        &self,
        _session: &SessionId,
        text: &str,
    ) -> Result<Message, ConversationError> {
        self.user_messages.lock().unwrap().push(text.to_string());
        Ok(Message::user(text))
    }

    async fn next_turn(
        &self,
        ctx: &ExecutionContext,
        _session: &SessionId,
    ) -> Result<Turn, ConversationError> {
        self.turns_requested.fetch_add(1, Ordering::SeqCst);
        let next = self.turns.lock().unwrap().pop_front();
        match next {
            Some(turn) => Ok(turn),
            None if self.hang_when_empty.load(Ordering::SeqCst) => {
                ctx.done().await;
                Err(ConversationError::CompletionFailed("context cancelled".into()))
            }
            None => Ok(turn("done", vec![])),
        }
    }

    async fn add_tool_results(
        &self,
        _session: &SessionId,
        results: &[ToolResult],
    ) -> Result<(), ConversationError> {
        self.result_batches.lock().unwrap().push(results.to_vec());
        Ok(())
    }

    async fn close_session(&self, _session: &SessionId) -> Result<(), ConversationError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn turn(text: &str, calls: Vec<ToolCall>) -> Turn {
    Turn {
        message: Message::assistant(text),
        tool_calls: calls,
    }
}

/// A tool call with an id derived from a global counter.
pub fn call(name: &str, args: Value) -> ToolCall {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let id = NEXT.fetch_add(1, Ordering::SeqCst);
    ToolCall::new(format!("call-{id}"), name, args)
}

// --- Tools ---

/// One recorded execution.
#[derive(Debug, Clone)]
pub struct Executed {
    pub name: String,
    pub input: Value,
    pub depth: u32,
    pub session: Option<String>,
}

/// Echoes its input for every advertised tool and records each call.
pub struct MockExecutor {
    tools: Vec<String>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    executed: Mutex<Vec<Executed>>,
}

impl MockExecutor {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            failing: HashSet::new(),
            panicking: HashSet::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, tool: &str) -> Self {
        self.failing.insert(tool.to_string());
        self
    }

    pub fn panicking(mut self, tool: &str) -> Self {
        self.panicking.insert(tool.to_string());
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_names(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.name).collect()
    }
}

#[async_trait]
impl ToolExecutor for MockExecutor {
    fn available_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|name| ToolDefinition::new(name, format!("mock {name}"), serde_json::json!({})))
            .collect()
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        input: &Value,
    ) -> Result<String, ToolError> {
        self.executed.lock().unwrap().push(Executed {
            name: name.to_string(),
            input: input.clone(),
            depth: ctx.subagent_depth(),
            session: ctx.session_id().map(|s| s.to_string()),
        });
        if !self.tools.iter().any(|t| t == name) {
            return Err(ToolError::NotFound(name.to_string()));
        }
        if self.panicking.contains(name) {
            panic!("scripted panic in {name}");
        }
        if self.failing.contains(name) {
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: "scripted failure".into(),
            });
        }
        Ok(format!("{name} ok: {input}"))
    }
}
