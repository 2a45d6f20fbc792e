//! Drives one investigation of one alert to a terminal result.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use vigil_config::InvestigationConfig;
use vigil_core::alert::AlertView;
use vigil_core::context::ExecutionContext;
use vigil_core::conversation::{ConversationService, SessionId};
use vigil_core::error::{Error, PolicyError, RunFailure};
use vigil_core::event::{DomainEvent, EventBus};
use vigil_core::investigation::{InvestigationResult, InvestigationStatus};
use vigil_core::prompt::PromptBuilder;
use vigil_core::provider::ToolDefinition;
use vigil_core::safety::SafetyEnforcer;
use vigil_core::skill::{SkillDescriptor, SkillProvider};
use vigil_core::store::InvestigationStore;
use vigil_core::tool::ToolExecutor;

use crate::engine::{ExecutionLoop, LoopExit, LoopSettings, RunContext, in_session};
use crate::persistence;
use crate::signals::SignalSet;

/// Outcome of a run: the result on success, the result plus its cause on
/// failure.
pub type RunOutcome<R> = Result<R, RunFailure<R>>;

/// Runs the investigation loop for a single alert.
///
/// Collaborators are shared and must tolerate concurrent use; all per-run
/// state lives on the stack of [`InvestigationRunner::run`].
#[derive(Clone)]
pub struct InvestigationRunner {
    conversation: Arc<dyn ConversationService>,
    tools: Arc<dyn ToolExecutor>,
    prompts: Arc<dyn PromptBuilder>,
    safety: Option<Arc<dyn SafetyEnforcer>>,
    skills: Option<Arc<dyn SkillProvider>>,
    store: Option<Arc<dyn InvestigationStore>>,
    events: Option<Arc<EventBus>>,
    config: InvestigationConfig,
}

impl InvestigationRunner {
    pub fn new(
        conversation: Arc<dyn ConversationService>,
        tools: Arc<dyn ToolExecutor>,
        prompts: Arc<dyn PromptBuilder>,
        config: InvestigationConfig,
    ) -> Self {
        Self {
            conversation,
            tools,
            prompts,
            safety: None,
            skills: None,
            store: None,
            events: None,
            config,
        }
    }

    pub fn with_safety(mut self, safety: Arc<dyn SafetyEnforcer>) -> Self {
        self.safety = Some(safety);
        self
    }

    pub fn with_skills(mut self, skills: Arc<dyn SkillProvider>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn InvestigationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &InvestigationConfig {
        &self.config
    }

    /// Investigate `alert` under `run_id`.
    ///
    /// Input problems (empty ids, a dead context) fail before any session is
    /// opened. Otherwise exactly one session is opened and always closed.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        alert: &AlertView,
        run_id: &str,
    ) -> RunOutcome<InvestigationResult> {
        if let Err(e) = validate(ctx, alert, run_id) {
            warn!(run_id, alert_id = %alert.id, error = %e, "Rejected investigation input");
            let result = InvestigationResult::failed(run_id, &alert.id, e.to_string());
            return Err(RunFailure::new(result, e));
        }

        let started = Instant::now();
        let run_ctx = match self.config.max_duration() {
            Some(limit) => ctx.clone().with_timeout(limit),
            None => ctx.clone(),
        };

        info!(run_id, alert_id = %alert.id, severity = %alert.severity, "Starting investigation");

        let (exit, actions_taken, session) = match self.conversation.open_session(&run_ctx).await {
            Ok(session) => {
                let (exit, actions) = in_session(
                    self.conversation.as_ref(),
                    &session,
                    self.investigate(&run_ctx, alert, run_id, &session),
                )
                .await;
                (exit, actions, Some(session))
            }
            Err(e) => (LoopExit::Aborted(e.into()), 0, None),
        };

        let (result, error) = self.build_result(alert, run_id, exit, actions_taken, started);

        if let Some(store) = &self.store {
            persistence::record_result(
                store.as_ref(),
                &result,
                session.as_ref().map(SessionId::as_str),
            )
            .await;
        }

        if let Some(events) = &self.events {
            events.publish(DomainEvent::InvestigationFinished {
                run_id: run_id.to_string(),
                alert_id: alert.id.clone(),
                status: result.status,
                actions_taken: result.actions_taken,
                timestamp: Utc::now(),
            });
        }

        info!(
            run_id,
            status = %result.status,
            actions = result.actions_taken,
            duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            escalated = result.escalated,
            "Investigation finished"
        );

        match error {
            None => Ok(result),
            Some(error) => Err(RunFailure::new(result, error)),
        }
    }

    /// Setup then iterate, inside an open session.
    async fn investigate(
        &self,
        ctx: &ExecutionContext,
        alert: &AlertView,
        run_id: &str,
        session: &SessionId,
    ) -> (LoopExit, u32) {
        let tools = self.visible_tools();
        let skills = self.discover_skills(ctx).await;

        let prompt = match self.prompts.investigation_prompt(alert, &tools, &skills) {
            Ok(prompt) => prompt,
            Err(e) => return (LoopExit::Aborted(e), 0),
        };
        if let Err(e) = self.conversation.set_system_prompt(session, &prompt).await {
            return (LoopExit::Aborted(e.into()), 0);
        }

        let trigger = format!("Investigate alert {} (investigation {run_id}).", alert.id);
        if let Err(e) = self.conversation.add_user_message(session, &trigger).await {
            return (LoopExit::Aborted(e.into()), 0);
        }

        let settings = LoopSettings {
            max_actions: self.config.max_actions,
            allowed_tools: self.config.allowed_tools.clone(),
            escalate_on_confidence: self.config.escalate_on_confidence,
            signals: SignalSet::INVESTIGATION,
            strip_delegate: false,
        };
        let engine = ExecutionLoop {
            conversation: self.conversation.as_ref(),
            tools: self.tools.as_ref(),
            safety: self.safety.as_deref(),
            events: self.events.as_deref(),
            settings: &settings,
        };

        let loop_ctx = ctx.clone().with_session(session.clone());
        let mut run = RunContext::new(run_id, session.clone(), &settings);
        let exit = engine.drive(&loop_ctx, &mut run).await;
        (exit, run.actions_taken)
    }

    fn visible_tools(&self) -> Vec<ToolDefinition> {
        let mut tools = self.tools.available_tools();
        if let Some(allowed) = &self.config.allowed_tools {
            tools.retain(|t| allowed.contains(&t.name));
        }
        tools
    }

    async fn discover_skills(&self, ctx: &ExecutionContext) -> Vec<SkillDescriptor> {
        let Some(skills) = &self.skills else {
            return Vec::new();
        };
        match skills.discover(ctx).await {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "Skill discovery failed, continuing without skills");
                Vec::new()
            }
        }
    }

    fn build_result(
        &self,
        alert: &AlertView,
        run_id: &str,
        exit: LoopExit,
        actions_taken: u32,
        started: Instant,
    ) -> (InvestigationResult, Option<Error>) {
        let mut result = InvestigationResult {
            actions_taken: actions_taken.min(self.config.max_actions),
            error: None,
            ..InvestigationResult::failed(run_id, &alert.id, "")
        };

        let error = match exit {
            LoopExit::Completed {
                confidence,
                findings,
            } => {
                result.status = InvestigationStatus::Completed;
                result.confidence = confidence;
                result.findings = findings;
                None
            }
            LoopExit::Escalated {
                reason,
                confidence,
                findings,
            } => {
                result.status = InvestigationStatus::Escalated;
                result.escalated = true;
                result.escalation_reason = Some(reason);
                result.confidence = confidence;
                result.findings = findings;
                None
            }
            LoopExit::Aborted(error) => {
                let message = error.to_string();
                if escalates(&error) {
                    result.status = InvestigationStatus::Escalated;
                    result.escalated = true;
                    result.escalation_reason = Some(message.clone());
                } else if self.config.escalate_on_errors && !error.is_cancelled() {
                    result.escalated = true;
                    result.escalation_reason = Some(message.clone());
                }
                result.error = Some(message);
                Some(error)
            }
        };

        result.duration = started.elapsed();
        (result, error)
    }
}

/// Budget and deadline violations hand the alert to a human; every other
/// abort is a plain failure.
fn escalates(error: &Error) -> bool {
    matches!(
        error,
        Error::Policy(PolicyError::Timeout | PolicyError::BudgetExceeded { .. })
    )
}

fn validate(ctx: &ExecutionContext, alert: &AlertView, run_id: &str) -> Result<(), Error> {
    if alert.id.trim().is_empty() {
        return Err(Error::InvalidInput("alert id is empty".into()));
    }
    if run_id.trim().is_empty() {
        return Err(Error::InvalidInput("investigation id is empty".into()));
    }
    ctx.check()?;
    Ok(())
}
