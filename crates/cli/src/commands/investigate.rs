//! `vigil investigate`: run one alert through the full investigation stack,
//! with a replayed transcript standing in for the model.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{debug, info, warn};
use vigil_agent::signals::{self, SignalSet};
use vigil_agent::{
    AlertInvestigationUseCase, DefaultPromptBuilder, DelegatingExecutor,
    ProviderConversationService, SubagentRunner,
};
use vigil_config::AppConfig;
use vigil_core::alert::AlertView;
use vigil_core::context::ExecutionContext;
use vigil_core::event::EventBus;
use vigil_core::investigation::{InvestigationResult, InvestigationStatus};
use vigil_core::provider::{Provider, ToolDefinition};
use vigil_core::subagent::SubagentDefinition;
use vigil_core::tool::ToolExecutor;
use vigil_security::{AuditLogger, PolicyEnforcer, SafetyPolicy, SubagentPolicies, TracingSink};

use super::config_cmd;
use crate::replay::ReplayProvider;

pub async fn run(
    config_path: Option<&Path>,
    alert_path: &Path,
    script_path: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let config = config_cmd::load(config_path).context("Failed to load config")?;

    let alert_json = std::fs::read_to_string(alert_path)
        .with_context(|| format!("Failed to read alert {}", alert_path.display()))?;
    let alert: AlertView = serde_json::from_str(&alert_json).context("Invalid alert JSON")?;

    let provider = Arc::new(ReplayProvider::from_file(script_path, &config.default_model)?);
    let use_case = build(&config, Arc::clone(&provider));

    let ctx = ExecutionContext::new();
    let interrupt = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling investigation");
                ctx.cancel();
            }
        })
    };

    let run_id = use_case.start_investigation(&ctx, &alert).await?;
    let (result, error) = match use_case.run_investigation(&ctx, &alert, &run_id).await {
        Ok(result) => (result, None),
        Err(failure) => {
            let (result, error) = failure.into_parts();
            (result, Some(error))
        }
    };
    interrupt.abort();
    use_case.shutdown();

    let unplayed = provider.remaining();
    if unplayed > 0 {
        warn!(unplayed, "Transcript has turns the investigation never reached");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    match error {
        Some(error) if result.status == InvestigationStatus::Failed => {
            bail!("investigation {run_id} failed: {error}")
        }
        Some(error) => {
            info!(run_id = %run_id, error = %error, "Investigation ended early");
            Ok(())
        }
        None => Ok(()),
    }
}

/// Wire the use case: shared conversation service, built-in tools, optional
/// subagent delegation, safety policies with audit, store and events.
fn build(config: &AppConfig, provider: Arc<ReplayProvider>) -> AlertInvestigationUseCase {
    let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)]));
    let registry: Arc<dyn ToolExecutor> = Arc::new(vigil_tools::default_registry());
    let prompts = Arc::new(DefaultPromptBuilder::new());
    let events = Arc::new(EventBus::default());
    spawn_event_logger(&events);

    let advertised = investigation_tools(registry.as_ref(), &config.agents);
    let provider: Arc<dyn Provider> = provider;
    let conversation = Arc::new(conversation_service(config, &provider, advertised));

    let tools: Arc<dyn ToolExecutor> = if config.agents.is_empty() {
        Arc::clone(&registry)
    } else {
        let subagent_tools = subagent_tools(registry.as_ref());
        let policies =
            SubagentPolicies::new(config.subagent.clone()).with_audit(Arc::clone(&audit));
        let runner = SubagentRunner::new(
            Arc::new(conversation_service(config, &provider, subagent_tools)),
            Arc::clone(&registry),
            prompts.clone(),
            config.subagent.clone(),
        )
        .with_provider(provider)
        .with_policies(Arc::new(policies))
        .with_events(Arc::clone(&events));
        Arc::new(DelegatingExecutor::new(
            Arc::clone(&registry),
            Arc::new(runner),
            config.agents.clone(),
            config.subagent.max_depth,
        ))
    };

    let safety = PolicyEnforcer::new(SafetyPolicy::from_investigation(&config.investigation))
        .with_audit(audit);

    AlertInvestigationUseCase::new(config.investigation.clone(), conversation, tools, prompts)
        .with_safety(Arc::new(safety))
        .with_store(vigil_store::open_store(&config.store))
        .with_events(events)
}

/// Tools advertised to investigation sessions: the registry, the delegate
/// tool when agents are configured, and both signals.
fn investigation_tools(
    registry: &dyn ToolExecutor,
    agents: &[SubagentDefinition],
) -> Vec<ToolDefinition> {
    let mut tools = registry.available_tools();
    if !agents.is_empty() {
        tools.push(DelegatingExecutor::tool_definition(agents));
    }
    tools.extend(signals::signal_definitions(SignalSet::INVESTIGATION));
    tools
}

/// Subagent sessions see neither the delegate tool nor the escalation signal.
fn subagent_tools(registry: &dyn ToolExecutor) -> Vec<ToolDefinition> {
    let mut tools = registry.available_tools();
    tools.extend(signals::signal_definitions(SignalSet::SUBAGENT));
    tools
}

fn conversation_service(
    config: &AppConfig,
    provider: &Arc<dyn Provider>,
    tools: Vec<ToolDefinition>,
) -> ProviderConversationService {
    ProviderConversationService::new(Arc::clone(provider))
        .with_tools(tools)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
}

fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            debug!(event = ?event, "Domain event");
        }
    });
}

fn print_summary(result: &InvestigationResult) {
    println!();
    println!("  Investigation {} (alert {})", result.investigation_id, result.alert_id);
    println!("  Status:      {}", result.status);
    println!("  Actions:     {}", result.actions_taken);
    println!("  Confidence:  {:.2}", result.confidence);
    println!("  Duration:    {}", format_duration(result.duration));
    if result.escalated {
        println!(
            "  Escalated:   {}",
            result.escalation_reason.as_deref().unwrap_or("yes")
        );
    }
    if let Some(error) = &result.error {
        println!("  Error:       {error}");
    }
    if !result.findings.is_empty() {
        println!("  Findings:");
        for finding in &result.findings {
            println!("    - {finding}");
        }
    }
    println!();
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
