//! Runs a delegated subtask in its own isolated session.
//!
//! Same loop as an investigation, plus: the delegate tool is always stripped,
//! the outbound context carries a [`SubagentContextInfo`], and a definition
//! may switch the provider's model for the duration of the run.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use vigil_config::SubagentConfig;
use vigil_core::context::{ExecutionContext, SubagentContextInfo};
use vigil_core::conversation::{ConversationService, SessionId};
use vigil_core::error::{Error, ProviderError, RunFailure};
use vigil_core::event::{DomainEvent, EventBus};
use vigil_core::investigation::{SubagentResult, SubagentStatus};
use vigil_core::prompt::PromptBuilder;
use vigil_core::provider::{Provider, ToolDefinition};
use vigil_core::safety::{SafetyEnforcer, SubagentSafety};
use vigil_core::skill::{SkillDescriptor, SkillProvider};
use vigil_core::subagent::SubagentDefinition;
use vigil_core::tool::ToolExecutor;

use crate::engine::{ExecutionLoop, LoopExit, LoopSettings, RunContext, in_session};
use crate::investigation_runner::RunOutcome;
use crate::signals::{DELEGATE_TOOL, SignalSet};

/// Restores the provider's previous model when dropped.
struct ModelRestore {
    provider: Arc<dyn Provider>,
    previous: String,
}

impl ModelRestore {
    fn switch(provider: &Arc<dyn Provider>, model: &str) -> Result<Self, ProviderError> {
        let previous = provider.active_model();
        provider.set_active_model(model)?;
        debug!(from = %previous, to = model, "Switched model for subagent");
        Ok(Self {
            provider: Arc::clone(provider),
            previous,
        })
    }
}

impl Drop for ModelRestore {
    fn drop(&mut self) {
        if let Err(e) = self.provider.set_active_model(&self.previous) {
            warn!(model = %self.previous, error = %e, "Failed to restore model after subagent run");
        }
    }
}

pub struct SubagentRunner {
    conversation: Arc<dyn ConversationService>,
    tools: Arc<dyn ToolExecutor>,
    prompts: Arc<dyn PromptBuilder>,
    provider: Option<Arc<dyn Provider>>,
    safety: Option<Arc<dyn SafetyEnforcer>>,
    policies: Option<Arc<dyn SubagentSafety>>,
    skills: Option<Arc<dyn SkillProvider>>,
    events: Option<Arc<EventBus>>,
    config: SubagentConfig,
}

impl SubagentRunner {
    pub fn new(
        conversation: Arc<dyn ConversationService>,
        tools: Arc<dyn ToolExecutor>,
        prompts: Arc<dyn PromptBuilder>,
        config: SubagentConfig,
    ) -> Self {
        Self {
            conversation,
            tools,
            prompts,
            provider: None,
            safety: None,
            policies: None,
            skills: None,
            events: None,
            config,
        }
    }

    /// Provider whose active model a definition may override.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// One enforcer shared by every run, whatever the definition.
    pub fn with_safety(mut self, safety: Arc<dyn SafetyEnforcer>) -> Self {
        self.safety = Some(safety);
        self
    }

    /// Build each run's enforcer from its definition. Takes precedence over
    /// [`with_safety`](Self::with_safety).
    pub fn with_policies(mut self, policies: Arc<dyn SubagentSafety>) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn with_skills(mut self, skills: Arc<dyn SkillProvider>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SubagentConfig {
        &self.config
    }

    /// Execute `task` as `agent` under `subagent_id`.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        agent: &SubagentDefinition,
        task: &str,
        subagent_id: &str,
    ) -> RunOutcome<SubagentResult> {
        if let Err(e) = validate(ctx, agent, task, subagent_id) {
            warn!(subagent_id, agent = %agent.name, error = %e, "Rejected subagent input");
            let result = SubagentResult::failed(subagent_id, &agent.name, e.to_string());
            return Err(RunFailure::new(result, e));
        }

        let started = Instant::now();
        let info = SubagentContextInfo::nested_in(ctx, subagent_id);
        let depth = info.depth;
        let mut run_ctx = ctx.clone().with_subagent(info);
        if let Some(limit) = self.config.max_duration() {
            run_ctx = run_ctx.with_timeout(limit);
        }

        info!(subagent_id, agent = %agent.name, depth, "Starting subagent");

        let _restore = match (agent.model_override(), &self.provider) {
            (Some(model), Some(provider)) => match ModelRestore::switch(provider, model) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    let result = SubagentResult::failed(subagent_id, &agent.name, e.to_string());
                    return Err(RunFailure::new(result, e));
                }
            },
            (Some(model), None) => {
                warn!(agent = %agent.name, model, "No provider attached, ignoring model override");
                None
            }
            (None, _) => None,
        };

        let max_actions = self.max_actions(agent);
        let safety = self.safety_for(agent);
        let (exit, actions_taken, last_message) =
            match self.conversation.open_session(&run_ctx).await {
                Ok(session) => {
                    let work = self.execute(
                        &run_ctx,
                        agent,
                        task,
                        subagent_id,
                        &session,
                        safety.as_deref(),
                    );
                    in_session(self.conversation.as_ref(), &session, work).await
                }
                Err(e) => (LoopExit::Aborted(e.into()), 0, String::new()),
            };

        let mut result = SubagentResult {
            actions_taken: actions_taken.min(max_actions),
            error: None,
            ..SubagentResult::failed(subagent_id, &agent.name, "")
        };
        let error = match exit {
            LoopExit::Completed { findings, .. } | LoopExit::Escalated { findings, .. } => {
                result.status = SubagentStatus::Completed;
                result.findings = findings;
                result.output = format!("[SUBAGENT: {}]\n\n{}", agent.name, last_message.trim());
                None
            }
            LoopExit::Aborted(error) => {
                result.error = Some(error.to_string());
                Some(error)
            }
        };
        result.duration = started.elapsed();

        if let Some(events) = &self.events {
            events.publish(DomainEvent::SubagentFinished {
                subagent_id: subagent_id.to_string(),
                agent_name: agent.name.clone(),
                status: result.status,
                depth,
                timestamp: Utc::now(),
            });
        }

        info!(
            subagent_id,
            agent = %agent.name,
            status = ?result.status,
            actions = result.actions_taken,
            "Subagent finished"
        );

        match error {
            None => Ok(result),
            Some(error) => Err(RunFailure::new(result, error)),
        }
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        agent: &SubagentDefinition,
        task: &str,
        subagent_id: &str,
        session: &SessionId,
        safety: Option<&dyn SafetyEnforcer>,
    ) -> (LoopExit, u32, String) {
        let allowed_tools = self.allowed_tools(agent);
        let tools = visible_tools(self.tools.as_ref(), allowed_tools.as_deref());
        let skills = self.discover_skills(ctx).await;

        let prompt = match self.prompts.subagent_prompt(agent, &tools, &skills) {
            Ok(prompt) => prompt,
            Err(e) => return (LoopExit::Aborted(e), 0, String::new()),
        };
        if let Err(e) = self.conversation.set_system_prompt(session, &prompt).await {
            return (LoopExit::Aborted(e.into()), 0, String::new());
        }
        if let Err(e) = self.conversation.add_user_message(session, task).await {
            return (LoopExit::Aborted(e.into()), 0, String::new());
        }

        let settings = LoopSettings {
            max_actions: self.max_actions(agent),
            allowed_tools,
            escalate_on_confidence: 0.0,
            signals: SignalSet::SUBAGENT,
            strip_delegate: true,
        };
        let engine = ExecutionLoop {
            conversation: self.conversation.as_ref(),
            tools: self.tools.as_ref(),
            safety,
            events: self.events.as_deref(),
            settings: &settings,
        };

        let loop_ctx = ctx.clone().with_session(session.clone());
        let mut run = RunContext::new(subagent_id, session.clone(), &settings);
        let exit = engine.drive(&loop_ctx, &mut run).await;
        (exit, run.actions_taken, run.last_message)
    }

    fn safety_for(&self, agent: &SubagentDefinition) -> Option<Arc<dyn SafetyEnforcer>> {
        match &self.policies {
            Some(policies) => Some(policies.for_definition(agent)),
            None => self.safety.clone(),
        }
    }

    /// The definition's allow-list wins over the configured one.
    fn allowed_tools(&self, agent: &SubagentDefinition) -> Option<Vec<String>> {
        agent
            .allowed_tools
            .clone()
            .or_else(|| self.config.allowed_tools.clone())
    }

    fn max_actions(&self, agent: &SubagentDefinition) -> u32 {
        agent.max_actions.unwrap_or(self.config.max_actions)
    }

    async fn discover_skills(&self, ctx: &ExecutionContext) -> Vec<SkillDescriptor> {
        let Some(skills) = &self.skills else {
            return Vec::new();
        };
        skills.discover(ctx).await.unwrap_or_else(|e| {
            debug!(error = %e, "Skill discovery failed, continuing without skills");
            Vec::new()
        })
    }
}

fn visible_tools(tools: &dyn ToolExecutor, allowed: Option<&[String]>) -> Vec<ToolDefinition> {
    tools
        .available_tools()
        .into_iter()
        .filter(|t| t.name != DELEGATE_TOOL)
        .filter(|t| allowed.is_none_or(|list| list.contains(&t.name)))
        .collect()
}

fn validate(
    ctx: &ExecutionContext,
    agent: &SubagentDefinition,
    task: &str,
    subagent_id: &str,
) -> Result<(), Error> {
    if agent.name.trim().is_empty() {
        return Err(Error::InvalidInput("subagent name is empty".into()));
    }
    if task.trim().is_empty() {
        return Err(Error::InvalidInput("task prompt is empty".into()));
    }
    if subagent_id.trim().is_empty() {
        return Err(Error::InvalidInput("subagent id is empty".into()));
    }
    ctx.check()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::DefaultPromptBuilder;
    use crate::signals::{COMPLETE_TOOL, ESCALATE_TOOL};
    use crate::test_helpers::{MockExecutor, ScriptedConversation, ScriptedProvider, call, turn};
    use serde_json::json;
    use vigil_core::conversation::Turn;
    use vigil_security::SubagentPolicies;

    fn runner(
        conversation: &Arc<ScriptedConversation>,
        tools: &Arc<MockExecutor>,
    ) -> SubagentRunner {
        SubagentRunner::new(
            conversation.clone(),
            tools.clone(),
            Arc::new(DefaultPromptBuilder::new()),
            SubagentConfig::default(),
        )
    }

    fn scripted(turns: Vec<Turn>) -> Arc<ScriptedConversation> {
        Arc::new(ScriptedConversation::new(turns))
    }

    fn log_reader() -> SubagentDefinition {
        SubagentDefinition::new("log-reader", "Find the first error in the logs.")
    }

    #[tokio::test]
    async fn completion_produces_prefixed_output() {
        let conversation = scripted(vec![
            turn("reading", vec![call("read_file", json!({ "path": "/var/log/app.log" }))]),
            turn(
                "  OOM killer fired at 03:12  ",
                vec![call(COMPLETE_TOOL, json!({ "findings": ["OOM at 03:12"] }))],
            ),
        ]);
        let tools = Arc::new(MockExecutor::new(&["read_file"]));

        let result = runner(&conversation, &tools)
            .run(&ExecutionContext::new(), &log_reader(), "scan the logs", "sub-1")
            .await
            .unwrap();

        assert_eq!(result.status, SubagentStatus::Completed);
        assert_eq!(result.output, "[SUBAGENT: log-reader]\n\nOOM killer fired at 03:12");
        assert_eq!(result.findings, vec!["OOM at 03:12".to_string()]);
        assert_eq!(result.actions_taken, 1);
        assert_eq!(conversation.user_messages()[0], "scan the logs");
        assert_eq!(conversation.opened(), conversation.closed());
    }

    #[tokio::test]
    async fn delegate_is_never_executed() {
        let conversation = scripted(vec![
            turn(
                "delegating",
                vec![
                    call(DELEGATE_TOOL, json!({ "agent": "x", "task": "y" })),
                    call("bash", json!({ "command": "ls" })),
                ],
            ),
            turn("done", vec![]),
        ]);
        let tools = Arc::new(MockExecutor::new(&["bash", DELEGATE_TOOL]));
        let agent = log_reader().with_allowed_tools(vec![DELEGATE_TOOL.into(), "bash".into()]);

        runner(&conversation, &tools)
            .run(&ExecutionContext::new(), &agent, "look around", "sub-1")
            .await
            .unwrap();

        assert_eq!(tools.executed_names(), vec!["bash"]);
        let prompt = &conversation.system_prompts()[0];
        assert!(!prompt.contains(&format!("- `{DELEGATE_TOOL}`:")));
        assert!(prompt.contains("- `bash`:"));
    }

    #[tokio::test]
    async fn escalation_is_dropped_in_subagents() {
        let conversation = scripted(vec![
            turn("hmm", vec![call(ESCALATE_TOOL, json!({ "reason": "stuck" }))]),
        ]);
        let tools = Arc::new(MockExecutor::new(&["bash"]));

        let result = runner(&conversation, &tools)
            .run(&ExecutionContext::new(), &log_reader(), "task", "sub-1")
            .await
            .unwrap();

        assert_eq!(result.status, SubagentStatus::Completed);
        assert_eq!(result.actions_taken, 0);
        assert_eq!(result.output, "[SUBAGENT: log-reader]\n\nhmm");
        assert!(tools.executed().is_empty());
    }

    #[tokio::test]
    async fn context_is_stamped_with_depth() {
        let conversation = scripted(vec![
            turn("a", vec![call("bash", json!({ "command": "ls" }))]),
            turn("done", vec![]),
            turn("b", vec![call("bash", json!({ "command": "ls" }))]),
            turn("done", vec![]),
        ]);
        let tools = Arc::new(MockExecutor::new(&["bash"]));
        let runner = runner(&conversation, &tools);

        let top = ExecutionContext::new().with_session(SessionId::from("parent"));
        runner.run(&top, &log_reader(), "task", "sub-1").await.unwrap();

        let nested = top
            .clone()
            .with_subagent(SubagentContextInfo::nested_in(&top, "sub-outer"));
        runner.run(&nested, &log_reader(), "task", "sub-2").await.unwrap();

        let depths: Vec<u32> = tools.executed().iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![1, 2]);
    }

    #[tokio::test]
    async fn model_override_is_restored() {
        let conversation = scripted(vec![turn("done", vec![])]);
        let tools = Arc::new(MockExecutor::new(&["bash"]));
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = log_reader().with_model("fast-model");

        runner(&conversation, &tools)
            .with_provider(provider.clone())
            .run(&ExecutionContext::new(), &agent, "task", "sub-1")
            .await
            .unwrap();

        assert_eq!(provider.switches(), vec!["fast-model", "base-model"]);
        assert_eq!(provider.active_model(), "base-model");
    }

    #[tokio::test]
    async fn model_is_restored_when_setup_fails() {
        let conversation = Arc::new(ScriptedConversation::new(vec![]).failing_system_prompt());
        let tools = Arc::new(MockExecutor::new(&["bash"]));
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = log_reader().with_model("fast-model");

        let failure = runner(&conversation, &tools)
            .with_provider(provider.clone())
            .run(&ExecutionContext::new(), &agent, "task", "sub-1")
            .await
            .unwrap_err();

        assert_eq!(failure.result.status, SubagentStatus::Failed);
        assert_eq!(provider.active_model(), "base-model");
        assert_eq!(conversation.opened(), 1);
        assert_eq!(conversation.closed(), 1);
    }

    #[tokio::test]
    async fn inherit_keeps_the_active_model() {
        let conversation = scripted(vec![turn("done", vec![])]);
        let tools = Arc::new(MockExecutor::new(&["bash"]));
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = log_reader().with_model("inherit");

        runner(&conversation, &tools)
            .with_provider(provider.clone())
            .run(&ExecutionContext::new(), &agent, "task", "sub-1")
            .await
            .unwrap();

        assert!(provider.switches().is_empty());
    }

    #[tokio::test]
    async fn empty_task_is_rejected_before_opening_a_session() {
        let conversation = scripted(vec![]);
        let tools = Arc::new(MockExecutor::new(&["bash"]));

        let failure = runner(&conversation, &tools)
            .run(&ExecutionContext::new(), &log_reader(), "   ", "sub-1")
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::InvalidInput(_)));
        assert_eq!(failure.result.status, SubagentStatus::Failed);
        assert_eq!(conversation.opened(), 0);
    }

    #[tokio::test]
    async fn definition_budget_overrides_config() {
        let calls: Vec<_> = (0..5)
            .map(|i| call("bash", json!({ "command": format!("echo {i}") })))
            .collect();
        let conversation = scripted(vec![turn("go", calls), turn("summary", vec![])]);
        let tools = Arc::new(MockExecutor::new(&["bash"]));
        let agent = SubagentDefinition {
            max_actions: Some(2),
            ..log_reader()
        };

        let result = runner(&conversation, &tools)
            .run(&ExecutionContext::new(), &agent, "task", "sub-1")
            .await
            .unwrap();

        assert_eq!(tools.executed().len(), 2);
        assert_eq!(result.actions_taken, 2);
        assert_eq!(result.output, "[SUBAGENT: log-reader]\n\nsummary");
    }

    #[tokio::test]
    async fn definition_limits_are_enforced_per_run() {
        let conversation = scripted(vec![
            turn("one", vec![call("read_file", json!({ "path": "a.log" }))]),
            turn("two", vec![call("read_file", json!({ "path": "b.log" }))]),
            turn("three", vec![call("read_file", json!({ "path": "c.log" }))]),
            turn("all three read", vec![]),
        ]);
        let tools = Arc::new(MockExecutor::new(&["bash", "read_file"]));
        let config = SubagentConfig {
            max_actions: 2,
            allowed_tools: Some(vec!["bash".into()]),
            ..SubagentConfig::default()
        };
        let agent = SubagentDefinition {
            allowed_tools: Some(vec!["read_file".into()]),
            max_actions: Some(5),
            ..log_reader()
        };
        let runner = SubagentRunner::new(
            conversation.clone(),
            tools.clone(),
            Arc::new(DefaultPromptBuilder::new()),
            config.clone(),
        )
        .with_policies(Arc::new(SubagentPolicies::new(config)));

        let result = runner
            .run(&ExecutionContext::new(), &agent, "read the logs", "sub-1")
            .await
            .unwrap();

        assert_eq!(result.status, SubagentStatus::Completed);
        assert_eq!(result.actions_taken, 3);
        assert_eq!(tools.executed_names(), vec!["read_file"; 3]);
        assert!(
            conversation
                .result_batches()
                .iter()
                .flatten()
                .all(|r| !r.output.starts_with("Blocked"))
        );
    }
}
