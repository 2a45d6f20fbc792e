//! The shared request / execute / feed-back cycle.
//!
//! Both runners drive the same [`ExecutionLoop`]; they differ only in their
//! [`LoopSettings`] and in how they turn a [`LoopExit`] into a result.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};
use vigil_core::context::ExecutionContext;
use vigil_core::conversation::{ConversationService, SessionId};
use vigil_core::error::{Error, PolicyError};
use vigil_core::event::{DomainEvent, EventBus};
use vigil_core::safety::SafetyEnforcer;
use vigil_core::tool::{SHELL_TOOL, ToolCall, ToolExecutor, ToolResult};

use crate::signals::{
    self, CompletionSignal, EscalationSignal, PartitionedCalls, SignalSet, SUMMARY_REQUEST,
};

/// Per-runner knobs of the loop.
#[derive(Debug, Clone)]
pub(crate) struct LoopSettings {
    pub max_actions: u32,
    /// `None` = all tools, empty = none
    pub allowed_tools: Option<Vec<String>>,
    /// Escalate a signal-free final message whose confidence is below this.
    /// 0 disables the check.
    pub escalate_on_confidence: f64,
    pub signals: SignalSet,
    pub strip_delegate: bool,
}

/// Loop-local state of one run. Owned by a single call to `run`.
#[derive(Debug)]
pub(crate) struct RunContext {
    pub run_id: String,
    pub session: SessionId,
    pub actions_taken: u32,
    pub max_actions: u32,
    /// Content of the most recent assistant message
    pub last_message: String,
}

impl RunContext {
    pub fn new(run_id: &str, session: SessionId, settings: &LoopSettings) -> Self {
        Self {
            run_id: run_id.to_string(),
            session,
            actions_taken: 0,
            max_actions: settings.max_actions,
            last_message: String::new(),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.max_actions.saturating_sub(self.actions_taken)
    }
}

/// How the loop ended.
#[derive(Debug)]
pub(crate) enum LoopExit {
    Completed {
        confidence: f64,
        findings: Vec<String>,
    },
    Escalated {
        reason: String,
        confidence: f64,
        findings: Vec<String>,
    },
    Aborted(Error),
}

/// One loop invocation's collaborators.
pub(crate) struct ExecutionLoop<'a> {
    pub conversation: &'a dyn ConversationService,
    pub tools: &'a dyn ToolExecutor,
    pub safety: Option<&'a dyn SafetyEnforcer>,
    pub events: Option<&'a EventBus>,
    pub settings: &'a LoopSettings,
}

impl ExecutionLoop<'_> {
    /// Iterate until a signal, a budget or deadline violation, or a final
    /// message without tool calls.
    pub async fn drive(&self, ctx: &ExecutionContext, run: &mut RunContext) -> LoopExit {
        loop {
            if let Err(e) = self.check_live(ctx) {
                return LoopExit::Aborted(e.into());
            }

            let turn = match self.conversation.next_turn(ctx, &run.session).await {
                Ok(turn) => turn,
                Err(e) => return LoopExit::Aborted(abort_cause(ctx, e.into())),
            };
            run.last_message = turn.message.content.clone();

            let calls = self.select_calls(turn.tool_calls, run.remaining());
            if calls.is_empty() {
                return self.finish_without_calls(run);
            }

            if let Some(safety) = self.safety
                && let Err(e) = safety.check_action_budget(run.actions_taken)
            {
                return LoopExit::Aborted(e.into());
            }

            let PartitionedCalls {
                complete,
                escalate,
                regular,
            } = signals::partition_calls(calls, self.settings.signals);

            let mut results = Vec::with_capacity(regular.len());
            for call in &regular {
                results.push(self.execute_one(ctx, run, call).await);
            }

            if !results.is_empty()
                && let Err(e) = self.conversation.add_tool_results(&run.session, &results).await
            {
                return LoopExit::Aborted(abort_cause(ctx, e.into()));
            }

            if let Some(call) = complete {
                let signal = CompletionSignal::from_call(&call);
                info!(run_id = %run.run_id, confidence = signal.confidence, "Completion signalled");
                return LoopExit::Completed {
                    confidence: signal.confidence,
                    findings: signal.findings,
                };
            }

            if let Some(call) = escalate {
                let signal = EscalationSignal::from_call(&call);
                info!(run_id = %run.run_id, reason = %signal.reason, "Escalation signalled");
                return LoopExit::Escalated {
                    reason: signal.reason,
                    confidence: 0.0,
                    findings: signal.findings,
                };
            }

            let remaining = run.remaining();
            if remaining == 0 {
                return self.forced_summary(ctx, run).await;
            }

            if let Some(warning) = signals::budget_warning(remaining)
                && let Err(e) = self.conversation.add_user_message(&run.session, &warning).await
            {
                return LoopExit::Aborted(abort_cause(ctx, e.into()));
            }
        }
    }

    fn check_live(&self, ctx: &ExecutionContext) -> Result<(), PolicyError> {
        ctx.check()?;
        match self.safety {
            Some(safety) => safety.check_timeout(ctx),
            None => Ok(()),
        }
    }

    fn select_calls(&self, raw: Vec<ToolCall>, remaining: u32) -> Vec<ToolCall> {
        let raw = signals::strip_unrecognized(raw, self.settings.signals);
        let raw = if self.settings.strip_delegate {
            signals::strip_delegate(raw)
        } else {
            raw
        };
        let mut calls = signals::filter_tool_calls(
            raw,
            self.settings.allowed_tools.as_deref(),
            self.settings.signals,
        );
        calls.truncate(usize::try_from(remaining).unwrap_or(usize::MAX));
        calls
    }

    fn finish_without_calls(&self, run: &RunContext) -> LoopExit {
        let text = run.last_message.trim();
        let findings = if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
        let confidence = signals::parse_confidence(text);
        let threshold = self.settings.escalate_on_confidence;

        if let Some(confidence) = confidence
            && threshold > 0.0
            && confidence < threshold
        {
            info!(run_id = %run.run_id, confidence, threshold, "Confidence below threshold");
            return LoopExit::Escalated {
                reason: format!("confidence {confidence:.2} is below threshold {threshold:.2}"),
                confidence,
                findings,
            };
        }

        debug!(run_id = %run.run_id, "Final message without tool calls");
        LoopExit::Completed {
            confidence: confidence.unwrap_or(0.0),
            findings,
        }
    }

    /// Budget spent: ask for a summary, take exactly one more turn and ignore
    /// any tool calls in it.
    async fn forced_summary(&self, ctx: &ExecutionContext, run: &mut RunContext) -> LoopExit {
        info!(
            run_id = %run.run_id,
            actions = run.actions_taken,
            "Action budget spent, requesting summary"
        );

        let summary = match self
            .conversation
            .add_user_message(&run.session, SUMMARY_REQUEST)
            .await
        {
            Ok(_) => self.conversation.next_turn(ctx, &run.session).await,
            Err(e) => Err(e),
        };

        let mut findings = Vec::new();
        let mut confidence = 0.0;
        match summary {
            Ok(turn) => {
                if !turn.tool_calls.is_empty() {
                    debug!(
                        run_id = %run.run_id,
                        count = turn.tool_calls.len(),
                        "Ignoring tool calls in summary turn"
                    );
                }
                run.last_message = turn.message.content.clone();
                let text = turn.message.content.trim();
                if !text.is_empty() {
                    findings.push(text.to_string());
                }
                confidence = signals::parse_confidence(text).unwrap_or(0.0);
            }
            Err(e) => warn!(run_id = %run.run_id, error = %e, "Summary turn failed"),
        }

        LoopExit::Completed {
            confidence,
            findings,
        }
    }

    /// Gate and execute one regular call. Always counts as one action.
    async fn execute_one(
        &self,
        ctx: &ExecutionContext,
        run: &mut RunContext,
        call: &ToolCall,
    ) -> ToolResult {
        run.actions_taken += 1;

        if let Err(e) = self.gate(call) {
            warn!(run_id = %run.run_id, tool = %call.name, reason = %e, "Tool call blocked");
            if let Some(events) = self.events {
                events.publish(DomainEvent::ToolBlocked {
                    run_id: run.run_id.clone(),
                    tool_name: call.name.clone(),
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
            return ToolResult::error(call, format!("Blocked: {e}"));
        }

        debug!(run_id = %run.run_id, tool = %call.name, "Executing tool");
        let start = Instant::now();
        let outcome = self.tools.execute(ctx, &call.name, &call.arguments).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Some(events) = self.events {
            events.publish(DomainEvent::ToolExecuted {
                run_id: run.run_id.clone(),
                tool_name: call.name.clone(),
                success: outcome.is_ok(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        match outcome {
            Ok(output) => ToolResult::success(call, output),
            Err(e) => {
                warn!(run_id = %run.run_id, tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(call, format!("Error: {e}"))
            }
        }
    }

    fn gate(&self, call: &ToolCall) -> Result<(), PolicyError> {
        let Some(safety) = self.safety else {
            return Ok(());
        };
        safety.check_tool_allowed(&call.name)?;
        if call.name == SHELL_TOOL {
            safety.check_command(call.command().unwrap_or_default())?;
        }
        Ok(())
    }
}

/// A collaborator failure seen after the context was cancelled is reported
/// as the cancellation.
fn abort_cause(ctx: &ExecutionContext, error: Error) -> Error {
    match ctx.check() {
        Err(policy) => policy.into(),
        Ok(()) => error,
    }
}

/// Run `work` inside an open session and close the session afterwards, on
/// success, error and panic alike.
pub(crate) async fn in_session<F, T>(
    conversation: &dyn ConversationService,
    session: &SessionId,
    work: F,
) -> T
where
    F: Future<Output = T>,
{
    let outcome = AssertUnwindSafe(work).catch_unwind().await;
    if let Err(e) = conversation.close_session(session).await {
        warn!(session = %session, error = %e, "Failed to close session");
    }
    match outcome {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
