//! Reserved tool names and the pure helpers that shape each turn's calls.
//!
//! Signals are tool names the loop interprets itself. They are never
//! forwarded to a tool executor and never count as actions.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{Value, json};
use vigil_core::provider::ToolDefinition;
use vigil_core::tool::ToolCall;

/// Ends the run successfully, carrying confidence and findings.
pub const COMPLETE_TOOL: &str = "complete_investigation";

/// Ends the run as escalated, carrying a reason and partial findings.
pub const ESCALATE_TOOL: &str = "escalate_investigation";

/// Hands a task to a named subagent. Never executed inside a subagent.
pub const DELEGATE_TOOL: &str = "delegate_to_subagent";

static CONFIDENCE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)confidence\s*:\s*([0-9]+(?:\.[0-9]+)?|\.[0-9]+)").ok());

/// Which signals a loop recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSet {
    pub escalation: bool,
}

impl SignalSet {
    /// Completion and escalation (investigations).
    pub const INVESTIGATION: Self = Self { escalation: true };

    /// Completion only (subagents).
    pub const SUBAGENT: Self = Self { escalation: false };

    pub fn is_signal(&self, name: &str) -> bool {
        name == COMPLETE_TOOL || (self.escalation && name == ESCALATE_TOOL)
    }
}

/// Keep calls permitted by `allowed` (`None` = all, empty = none), in order.
///
/// Recognized signals always pass: they are protocol, not tools.
pub fn filter_tool_calls(
    calls: Vec<ToolCall>,
    allowed: Option<&[String]>,
    signals: SignalSet,
) -> Vec<ToolCall> {
    let Some(allowed) = allowed else {
        return calls;
    };
    calls
        .into_iter()
        .filter(|c| signals.is_signal(&c.name) || allowed.iter().any(|a| a == &c.name))
        .collect()
}

/// Drop every call naming the delegate tool.
pub fn strip_delegate(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    calls.into_iter().filter(|c| c.name != DELEGATE_TOOL).collect()
}

/// Drop reserved signal names this loop does not recognize, so they never
/// reach a tool executor.
pub fn strip_unrecognized(calls: Vec<ToolCall>, signals: SignalSet) -> Vec<ToolCall> {
    if signals.escalation {
        return calls;
    }
    calls.into_iter().filter(|c| c.name != ESCALATE_TOOL).collect()
}

/// One turn's calls split by role. Last occurrence of each signal wins.
#[derive(Debug, Default)]
pub struct PartitionedCalls {
    pub complete: Option<ToolCall>,
    pub escalate: Option<ToolCall>,
    pub regular: Vec<ToolCall>,
}

pub fn partition_calls(calls: Vec<ToolCall>, signals: SignalSet) -> PartitionedCalls {
    let mut out = PartitionedCalls::default();
    for call in calls {
        if call.name == COMPLETE_TOOL {
            out.complete = Some(call);
        } else if signals.escalation && call.name == ESCALATE_TOOL {
            out.escalate = Some(call);
        } else {
            out.regular.push(call);
        }
    }
    out
}

/// The first `confidence: <float>` token in `text`, if it lies in [0, 1].
pub fn parse_confidence(text: &str) -> Option<f64> {
    let re = CONFIDENCE_RE.as_ref()?;
    let caps = re.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    (0.0..=1.0).contains(&value).then_some(value)
}

/// Pacing hint for the model once the budget runs low.
pub fn budget_warning(remaining: u32) -> Option<String> {
    match remaining {
        5 => Some(
            "You have 5 actions left. Start narrowing down to the most likely cause.".into(),
        ),
        2..=4 => Some(format!(
            "Only {remaining} actions left. Prioritize the checks that confirm or rule out your \
             leading hypothesis, then call {COMPLETE_TOOL}."
        )),
        1 => Some(format!(
            "This is your last action. Use it wisely or call {COMPLETE_TOOL} with what you have."
        )),
        _ => None,
    }
}

/// Sent once the budget is spent; the reply is the run's closing summary.
pub const SUMMARY_REQUEST: &str = "You have used every available action. Do not call any more \
     tools. Summarize what you found, the most likely root cause, and your confidence.";

/// Fields carried by the completion signal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionSignal {
    pub confidence: f64,
    pub findings: Vec<String>,
}

impl CompletionSignal {
    pub fn from_call(call: &ToolCall) -> Self {
        let confidence = call
            .arguments
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.0);
        Self {
            confidence,
            findings: string_list(call.arguments.get("findings")),
        }
    }
}

/// Fields carried by the escalation signal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EscalationSignal {
    pub reason: String,
    pub findings: Vec<String>,
}

impl EscalationSignal {
    pub fn from_call(call: &ToolCall) -> Self {
        let reason = call
            .arguments
            .get("reason")
            .and_then(Value::as_str)
            .filter(|r| !r.trim().is_empty())
            .unwrap_or("escalation requested")
            .to_string();
        Self {
            reason,
            findings: string_list(call.arguments.get("findings")),
        }
    }
}

/// Accepts a list of strings or a single string.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Definitions of the signals a loop recognizes, for advertising to the model.
pub fn signal_definitions(signals: SignalSet) -> Vec<ToolDefinition> {
    let mut defs = vec![ToolDefinition::new(
        COMPLETE_TOOL,
        "Finish the task. Report your findings and how confident you are in them.",
        json!({
            "type": "object",
            "properties": {
                "confidence": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Confidence in the findings, 0 to 1"
                },
                "findings": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Findings, most important first"
                }
            },
            "required": ["confidence", "findings"]
        }),
    )];
    if signals.escalation {
        defs.push(ToolDefinition::new(
            ESCALATE_TOOL,
            "Hand the investigation to a human. Use when you cannot reach a safe conclusion.",
            json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string", "description": "Why a human is needed" },
                    "findings": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "What you found so far"
                    }
                },
                "required": ["reason"]
            }),
        ));
    }
    defs
}
