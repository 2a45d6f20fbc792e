//! The investigation registry: which alerts are being investigated, by which
//! run, and how to stop them.
//!
//! One read/write lock guards the registry maps. It is held only for map
//! access; the loop itself always runs unlocked.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_config::InvestigationConfig;
use vigil_core::alert::AlertView;
use vigil_core::context::ExecutionContext;
use vigil_core::conversation::ConversationService;
use vigil_core::error::{Error, PolicyError, RegistryError, RunFailure};
use vigil_core::event::{DomainEvent, EventBus};
use vigil_core::investigation::InvestigationResult;
use vigil_core::prompt::PromptBuilder;
use vigil_core::safety::SafetyEnforcer;
use vigil_core::skill::SkillProvider;
use vigil_core::store::InvestigationStore;
use vigil_core::tool::ToolExecutor;

use crate::investigation_runner::{InvestigationRunner, RunOutcome};
use crate::persistence;

#[derive(Debug, Clone)]
struct ActiveRun {
    run_id: String,
    alert_id: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Registry {
    by_run: HashMap<String, ActiveRun>,
    /// alert id -> run id
    by_alert: HashMap<String, String>,
    shutdown: bool,
}

impl Registry {
    /// Remove `run_id`, and its alert mapping only if it still points here.
    fn remove(&mut self, run_id: &str) -> Option<ActiveRun> {
        let run = self.by_run.remove(run_id)?;
        if self.by_alert.get(&run.alert_id).map(String::as_str) == Some(run_id) {
            self.by_alert.remove(&run.alert_id);
        }
        Some(run)
    }
}

/// Read-only snapshot of a registered run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveInvestigation {
    pub run_id: String,
    pub alert_id: String,
    pub started_at: DateTime<Utc>,
}

impl From<&ActiveRun> for ActiveInvestigation {
    fn from(run: &ActiveRun) -> Self {
        Self {
            run_id: run.run_id.clone(),
            alert_id: run.alert_id.clone(),
            started_at: run.started_at,
        }
    }
}

type SharedRegistry = Arc<RwLock<Registry>>;

fn read(registry: &SharedRegistry) -> RwLockReadGuard<'_, Registry> {
    registry.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(registry: &SharedRegistry) -> RwLockWriteGuard<'_, Registry> {
    registry.write().unwrap_or_else(PoisonError::into_inner)
}

/// Deregisters a run exactly once, however `run_investigation` exits.
struct RegistrationGuard {
    registry: SharedRegistry,
    run_id: String,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(run) = write(&self.registry).remove(&self.run_id) {
            run.cancel.cancel();
        }
    }
}

/// Starts, tracks, stops and shuts down alert investigations.
pub struct AlertInvestigationUseCase {
    config: InvestigationConfig,
    conversation: Arc<dyn ConversationService>,
    tools: Arc<dyn ToolExecutor>,
    prompts: Arc<dyn PromptBuilder>,
    safety: Option<Arc<dyn SafetyEnforcer>>,
    skills: Option<Arc<dyn SkillProvider>>,
    store: Option<Arc<dyn InvestigationStore>>,
    events: Option<Arc<EventBus>>,
    registry: SharedRegistry,
}

impl AlertInvestigationUseCase {
    pub fn new(
        config: InvestigationConfig,
        conversation: Arc<dyn ConversationService>,
        tools: Arc<dyn ToolExecutor>,
        prompts: Arc<dyn PromptBuilder>,
    ) -> Self {
        Self {
            config,
            conversation,
            tools,
            prompts,
            safety: None,
            skills: None,
            store: None,
            events: None,
            registry: Arc::new(RwLock::new(Registry::default())),
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

    /// Register an investigation for `alert` and return its run id.
    pub async fn start_investigation(
        &self,
        ctx: &ExecutionContext,
        alert: &AlertView,
    ) -> Result<String, Error> {
        if alert.id.trim().is_empty() {
            return Err(RegistryError::InvalidAlert("alert id is empty".into()).into());
        }
        ctx.check()?;

        let run_id = format!("inv-{}", Uuid::new_v4());
        {
            let mut registry = write(&self.registry);
            if registry.shutdown {
                return Err(RegistryError::Shutdown.into());
            }
            if let Some(existing) = registry.by_alert.get(&alert.id) {
                return Err(RegistryError::AlreadyRunning {
                    alert_id: alert.id.clone(),
                    run_id: existing.clone(),
                }
                .into());
            }
            let max = self.config.max_concurrent;
            if max > 0 && registry.by_run.len() >= max {
                return Err(RegistryError::MaxConcurrentReached { max }.into());
            }

            registry.by_alert.insert(alert.id.clone(), run_id.clone());
            registry.by_run.insert(
                run_id.clone(),
                ActiveRun {
                    run_id: run_id.clone(),
                    alert_id: alert.id.clone(),
                    started_at: Utc::now(),
                    cancel: ctx.cancellation_token().child_token(),
                },
            );
        }

        info!(run_id = %run_id, alert_id = %alert.id, "Investigation registered");

        if let Some(store) = &self.store {
            persistence::record_started(store.as_ref(), &run_id, &alert.id).await;
        }
        if let Some(events) = &self.events {
            events.publish(DomainEvent::InvestigationStarted {
                run_id: run_id.clone(),
                alert_id: alert.id.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(run_id)
    }

    /// Execute a registered investigation to its terminal result.
    ///
    /// The run is deregistered when this returns, whatever the outcome.
    /// Stopping the run or shutting down the use case cancels the loop.
    pub async fn run_investigation(
        &self,
        ctx: &ExecutionContext,
        alert: &AlertView,
        run_id: &str,
    ) -> RunOutcome<InvestigationResult> {
        let stop = {
            let registry = read(&self.registry);
            if registry.shutdown {
                return Err(rejected(run_id, alert, RegistryError::Shutdown));
            }
            match registry.by_run.get(run_id) {
                None => {
                    return Err(rejected(
                        run_id,
                        alert,
                        RegistryError::NotFound(run_id.to_string()),
                    ));
                }
                Some(run) if run.alert_id != alert.id => {
                    return Err(rejected(
                        run_id,
                        alert,
                        RegistryError::InvalidAlert(format!(
                            "run {run_id} belongs to alert {}, not {}",
                            run.alert_id, alert.id
                        )),
                    ));
                }
                Some(run) => run.cancel.clone(),
            }
        };
        let _registration = RegistrationGuard {
            registry: Arc::clone(&self.registry),
            run_id: run_id.to_string(),
        };

        if self.all_tools_blocked() {
            warn!(run_id, alert_id = %alert.id, "Every allowed tool is blocked, not starting loop");
            let error = Error::Policy(PolicyError::AllToolsBlocked);
            let mut result = InvestigationResult::failed(run_id, &alert.id, error.to_string());
            result.escalated = true;
            result.escalation_reason = Some("fully sandboxed, cannot proceed".into());
            if let Some(store) = &self.store {
                persistence::record_result(store.as_ref(), &result, None).await;
            }
            return Err(RunFailure::new(result, error));
        }

        // The loop honours both the caller's context and the stop handle.
        let run_ctx = ctx.child();
        let link = {
            let run_token = run_ctx.cancellation_token().clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = stop.cancelled() => run_token.cancel(),
                    _ = run_token.cancelled() => {}
                }
            })
        };

        let outcome = self.runner().run(&run_ctx, alert, run_id).await;
        link.abort();
        outcome
    }

    /// Start and run an investigation for a critical alert when
    /// `auto_start_for_critical` is set. Other alerts return `Ok(None)`.
    ///
    /// A run that fails still yields its result; only registration errors
    /// are returned as `Err`.
    pub async fn handle_alert(
        &self,
        ctx: &ExecutionContext,
        alert: &AlertView,
    ) -> Result<Option<InvestigationResult>, Error> {
        if !(self.config.auto_start_for_critical && alert.is_critical()) {
            return Ok(None);
        }
        let run_id = self.start_investigation(ctx, alert).await?;
        match self.run_investigation(ctx, alert, &run_id).await {
            Ok(result) => Ok(Some(result)),
            Err(failure) => {
                warn!(run_id = %run_id, error = %failure.error, "Investigation failed");
                Ok(Some(failure.result))
            }
        }
    }

    /// Cancel and deregister a run.
    pub async fn stop_investigation(
        &self,
        _ctx: &ExecutionContext,
        run_id: &str,
    ) -> Result<(), Error> {
        let run = write(&self.registry)
            .remove(run_id)
            .ok_or_else(|| RegistryError::NotFound(run_id.to_string()))?;
        run.cancel.cancel();

        info!(run_id, alert_id = %run.alert_id, "Investigation stopped");

        if let Some(store) = &self.store {
            persistence::record_stopped(store.as_ref(), run_id, &run.alert_id).await;
        }
        if let Some(events) = &self.events {
            events.publish(DomainEvent::InvestigationStopped {
                run_id: run_id.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    pub fn get_investigation_status(&self, run_id: &str) -> Option<ActiveInvestigation> {
        read(&self.registry)
            .by_run
            .get(run_id)
            .map(ActiveInvestigation::from)
    }

    /// Registered runs, oldest first.
    pub fn list_active_investigations(&self) -> Vec<ActiveInvestigation> {
        let mut runs: Vec<ActiveInvestigation> = read(&self.registry)
            .by_run
            .values()
            .map(ActiveInvestigation::from)
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        runs
    }

    pub fn active_count(&self) -> usize {
        read(&self.registry).by_run.len()
    }

    pub fn is_shutdown(&self) -> bool {
        read(&self.registry).shutdown
    }

    /// Refuse new work, cancel every registered run and clear the registry.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        let mut registry = write(&self.registry);
        if registry.shutdown {
            return;
        }
        registry.shutdown = true;
        let cancelled = registry.by_run.len();
        for run in registry.by_run.values() {
            run.cancel.cancel();
        }
        registry.by_run.clear();
        registry.by_alert.clear();
        info!(cancelled, "Investigation service shut down");
    }

    /// True when an empty allow-list leaves nothing to run, or when the
    /// safety policy rejects every candidate tool. Candidates are the
    /// allow-list, or every available tool without one.
    fn all_tools_blocked(&self) -> bool {
        let candidates: Vec<String> = match &self.config.allowed_tools {
            Some(allowed) if allowed.is_empty() => return true,
            Some(allowed) => allowed.clone(),
            None => self
                .tools
                .available_tools()
                .into_iter()
                .map(|t| t.name)
                .collect(),
        };
        let Some(safety) = &self.safety else {
            return false;
        };
        !candidates.is_empty()
            && candidates
                .iter()
                .all(|name| safety.check_tool_allowed(name).is_err())
    }

    fn runner(&self) -> InvestigationRunner {
        let mut runner = InvestigationRunner::new(
            Arc::clone(&self.conversation),
            Arc::clone(&self.tools),
            Arc::clone(&self.prompts),
            self.config.clone(),
        );
        if let Some(safety) = &self.safety {
            runner = runner.with_safety(Arc::clone(safety));
        }
        if let Some(skills) = &self.skills {
            runner = runner.with_skills(Arc::clone(skills));
        }
        if let Some(store) = &self.store {
            runner = runner.with_store(Arc::clone(store));
        }
        if let Some(events) = &self.events {
            runner = runner.with_events(Arc::clone(events));
        }
        runner
    }
}

impl Drop for AlertInvestigationUseCase {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn rejected(
    run_id: &str,
    alert: &AlertView,
    error: RegistryError,
) -> RunFailure<InvestigationResult> {
    let result = InvestigationResult::failed(run_id, &alert.id, error.to_string());
    RunFailure::new(result, error)
}
