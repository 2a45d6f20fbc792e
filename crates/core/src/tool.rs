//! Tool ports: the abstraction over agent capabilities.
//!
//! Tools are what give an investigation the ability to act: run shell
//! commands, read files, delegate to a subagent. The loop only ever sees the
//! [`ToolExecutor`] port; [`ToolRegistry`] is the standard executor built from
//! individual [`Tool`] implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Name of the shell-execution tool. Its `command` argument is additionally
/// checked against the blocked-command patterns.
pub const SHELL_TOOL: &str = "bash";

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// The `command` string field of the arguments, when present.
    pub fn command(&self) -> Option<&str> {
        self.arguments.get("command").and_then(serde_json::Value::as_str)
    }
}

/// The outcome of one tool call, as fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Name of the tool that was called
    pub tool_name: String,

    /// The output content, or the error text
    pub output: String,

    /// Whether the call failed or was refused
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: message.into(),
            is_error: true,
        }
    }
}

/// The executor port consumed by the investigation loop.
///
/// Implementations must be safe for concurrent use by many runs.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Every tool this executor can run.
    fn available_tools(&self) -> Vec<ToolDefinition>;

    /// Execute one tool by name with structured input.
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        input: &serde_json::Value,
    ) -> std::result::Result<String, ToolError>;
}

/// A single capability registered in a [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "bash", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        arguments: &serde_json::Value,
    ) -> std::result::Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// A registry of available tools, usable directly as a [`ToolExecutor`].
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn available_tools(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        input: &serde_json::Value,
    ) -> std::result::Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(ctx, input).await
    }
}
