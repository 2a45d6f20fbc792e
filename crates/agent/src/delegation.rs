//! Tool executor that adds subagent delegation on top of another executor.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;
use vigil_core::context::ExecutionContext;
use vigil_core::error::ToolError;
use vigil_core::provider::ToolDefinition;
use vigil_core::subagent::SubagentDefinition;
use vigil_core::tool::ToolExecutor;

use crate::signals::DELEGATE_TOOL;
use crate::subagent_runner::SubagentRunner;

/// Routes [`DELEGATE_TOOL`] calls to a [`SubagentRunner`] and forwards every
/// other call to the inner executor.
///
/// Delegation is refused once the calling context is already `max_depth`
/// subagents deep.
pub struct DelegatingExecutor {
    inner: Arc<dyn ToolExecutor>,
    runner: Arc<SubagentRunner>,
    agents: Vec<SubagentDefinition>,
    max_depth: u32,
}

impl DelegatingExecutor {
    pub fn new(
        inner: Arc<dyn ToolExecutor>,
        runner: Arc<SubagentRunner>,
        agents: Vec<SubagentDefinition>,
        max_depth: u32,
    ) -> Self {
        Self {
            inner,
            runner,
            agents,
            max_depth,
        }
    }

    /// The advertised definition of the delegate tool for `agents`.
    pub fn tool_definition(agents: &[SubagentDefinition]) -> ToolDefinition {
        let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        let catalogue = agents
            .iter()
            .map(|a| format!("{} ({})", a.name, a.description))
            .collect::<Vec<_>>()
            .join(", ");
        ToolDefinition::new(
            DELEGATE_TOOL,
            format!("Hand a focused subtask to a specialist subagent. Available: {catalogue}"),
            json!({
                "type": "object",
                "properties": {
                    "agent": { "type": "string", "enum": names },
                    "task": { "type": "string", "description": "What the subagent should do" }
                },
                "required": ["agent", "task"]
            }),
        )
    }

    async fn delegate(&self, ctx: &ExecutionContext, input: &Value) -> Result<String, ToolError> {
        let depth = ctx.subagent_depth();
        if depth >= self.max_depth {
            return Err(ToolError::PermissionDenied {
                tool_name: DELEGATE_TOOL.into(),
                reason: format!("delegation depth {depth} reached the limit of {}", self.max_depth),
            });
        }

        let name = input["agent"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'agent' argument".into()))?;
        let task = input["task"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'task' argument".into()))?;
        let agent = self.agents.iter().find(|a| a.name == name).ok_or_else(|| {
            let known: Vec<&str> = self.agents.iter().map(|a| a.name.as_str()).collect();
            ToolError::InvalidArguments(format!(
                "Unknown subagent '{name}', expected one of: {}",
                known.join(", ")
            ))
        })?;

        let subagent_id = format!("sub-{}", Uuid::new_v4());
        info!(subagent_id, agent = name, depth = depth + 1, "Delegating task");

        match self.runner.run(ctx, agent, task, &subagent_id).await {
            Ok(result) => {
                let mut out = result.output;
                if !result.findings.is_empty() {
                    out.push_str("\n\nFindings:\n");
                    for finding in &result.findings {
                        out.push_str("- ");
                        out.push_str(finding);
                        out.push('\n');
                    }
                }
                Ok(out)
            }
            Err(failure) => Err(ToolError::ExecutionFailed {
                tool_name: DELEGATE_TOOL.into(),
                reason: failure.error.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ToolExecutor for DelegatingExecutor {
    fn available_tools(&self) -> Vec<ToolDefinition> {
        let mut tools = self.inner.available_tools();
        if !self.agents.is_empty() {
            tools.push(Self::tool_definition(&self.agents));
        }
        tools
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        input: &Value,
    ) -> Result<String, ToolError> {
        if name == DELEGATE_TOOL {
            return self.delegate(ctx, input).await;
        }
        self.inner.execute(ctx, name, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation_runner::InvestigationRunner;
    use crate::prompt::DefaultPromptBuilder;
    use crate::signals::COMPLETE_TOOL;
    use crate::test_helpers::{MockExecutor, ScriptedConversation, call, turn};
    use vigil_config::{InvestigationConfig, SubagentConfig};
    use vigil_core::alert::{AlertView, Severity};
    use vigil_core::context::SubagentContextInfo;
    use vigil_core::conversation::Turn;
    use vigil_core::investigation::InvestigationStatus;

    fn agents() -> Vec<SubagentDefinition> {
        vec![SubagentDefinition {
            description: "Reads logs".into(),
            ..SubagentDefinition::new("log-reader", "Find the first error.")
        }]
    }

    fn executor(
        turns: Vec<Turn>,
        agents: Vec<SubagentDefinition>,
    ) -> (Arc<ScriptedConversation>, Arc<MockExecutor>, DelegatingExecutor) {
        let conversation = Arc::new(ScriptedConversation::new(turns));
        let inner = Arc::new(MockExecutor::new(&["bash"]));
        let runner = Arc::new(SubagentRunner::new(
            conversation.clone(),
            inner.clone(),
            Arc::new(DefaultPromptBuilder::new()),
            SubagentConfig::default(),
        ));
        let delegating = DelegatingExecutor::new(inner.clone(), runner, agents, 2);
        (conversation, inner, delegating)
    }

    #[test]
    fn delegate_is_advertised_only_with_agents() {
        let (_, _, with_agents) = executor(vec![], agents());
        let names: Vec<String> = with_agents
            .available_tools()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["bash", DELEGATE_TOOL]);

        let (_, _, without) = executor(vec![], vec![]);
        assert_eq!(without.available_tools().len(), 1);
    }

    #[tokio::test]
    async fn delegation_runs_the_subagent_one_level_down() {
        let (_, inner, delegating) = executor(
            vec![
                turn("reading", vec![call("bash", json!({ "command": "tail app.log" }))]),
                turn(
                    "first error is a timeout",
                    vec![call(COMPLETE_TOOL, json!({ "findings": ["db timeout at 03:12"] }))],
                ),
            ],
            agents(),
        );

        let output = delegating
            .execute(
                &ExecutionContext::new(),
                DELEGATE_TOOL,
                &json!({ "agent": "log-reader", "task": "scan app.log" }),
            )
            .await
            .unwrap();

        assert!(output.starts_with("[SUBAGENT: log-reader]"));
        assert!(output.contains("first error is a timeout"));
        assert!(output.contains("- db timeout at 03:12"));
        assert_eq!(inner.executed()[0].depth, 1);
    }

    #[tokio::test]
    async fn delegation_stops_at_max_depth() {
        let (conversation, _, delegating) = executor(vec![], agents());
        let top = ExecutionContext::new();
        let one = top.clone().with_subagent(SubagentContextInfo::nested_in(&top, "s1"));
        let two = one.clone().with_subagent(SubagentContextInfo::nested_in(&one, "s2"));

        let err = delegating
            .execute(&two, DELEGATE_TOOL, &json!({ "agent": "log-reader", "task": "t" }))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::PermissionDenied { .. }));
        assert_eq!(conversation.opened(), 0);
    }

    #[tokio::test]
    async fn bad_arguments_are_rejected() {
        let (_, _, delegating) = executor(vec![], agents());
        let ctx = ExecutionContext::new();

        let unknown = delegating
            .execute(&ctx, DELEGATE_TOOL, &json!({ "agent": "nobody", "task": "t" }))
            .await
            .unwrap_err();
        assert!(unknown.to_string().contains("log-reader"));

        let missing = delegating
            .execute(&ctx, DELEGATE_TOOL, &json!({ "agent": "log-reader" }))
            .await
            .unwrap_err();
        assert!(matches!(missing, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn other_tools_go_to_the_inner_executor() {
        let (_, inner, delegating) = executor(vec![], agents());
        let output = delegating
            .execute(&ExecutionContext::new(), "bash", &json!({ "command": "uptime" }))
            .await
            .unwrap();
        assert!(output.starts_with("bash ok"));
        assert_eq!(inner.executed_names(), vec!["bash"]);
    }

    #[tokio::test]
    async fn investigation_can_delegate() {
        let (conversation, inner, delegating) = executor(
            vec![
                turn(
                    "asking a specialist",
                    vec![call(DELEGATE_TOOL, json!({ "agent": "log-reader", "task": "scan" }))],
                ),
                turn("disk filled by logs", vec![call(COMPLETE_TOOL, json!({}))]),
                turn("Root cause: log rotation broke. confidence: 0.9", vec![]),
            ],
            agents(),
        );
        let runner = InvestigationRunner::new(
            conversation.clone(),
            Arc::new(delegating),
            Arc::new(DefaultPromptBuilder::new()),
            InvestigationConfig::default(),
        );

        let result = runner
            .run(&ExecutionContext::new(), &AlertView::new("a1", Severity::Critical), "inv-1")
            .await
            .unwrap();

        assert_eq!(result.status, InvestigationStatus::Completed);
        assert_eq!(result.actions_taken, 1);
        assert!(inner.executed().is_empty());
        assert_eq!(conversation.opened(), 2);
        assert_eq!(conversation.closed(), 2);
        let delegated = &conversation.result_batches()[0][0];
        assert!(delegated.output.contains("[SUBAGENT: log-reader]"));
    }
}
