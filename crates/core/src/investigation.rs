//! Outcome snapshots and persisted run records.
//!
//! A result is built exactly once, at a run's terminal transition, and never
//! mutated afterwards. A record is the persisted, updatable view of the same
//! run, keyed by run id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle status of an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    /// Registered and running (records only)
    Started,
    Completed,
    Failed,
    Escalated,
    /// Stopped on request (records only)
    Stopped,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationStatus::Started => "started",
            InvestigationStatus::Completed => "completed",
            InvestigationStatus::Failed => "failed",
            InvestigationStatus::Escalated => "escalated",
            InvestigationStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvestigationStatus::Started)
    }
}

impl std::fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one investigation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub investigation_id: String,
    pub alert_id: String,
    pub status: InvestigationStatus,

    /// Ordered findings reported by the model
    #[serde(default)]
    pub findings: Vec<String>,

    pub actions_taken: u32,
    pub duration: Duration,

    /// Self-reported confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub escalated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvestigationResult {
    /// A `failed` snapshot with no work recorded.
    pub fn failed(
        investigation_id: impl Into<String>,
        alert_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            investigation_id: investigation_id.into(),
            alert_id: alert_id.into(),
            status: InvestigationStatus::Failed,
            findings: Vec::new(),
            actions_taken: 0,
            duration: Duration::ZERO,
            confidence: 0.0,
            escalated: false,
            escalation_reason: None,
            error: Some(error.into()),
        }
    }
}

/// Terminal status of a subagent run. Subagents have no escalation concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Completed,
    Failed,
}

/// Terminal outcome of one delegated subtask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentResult {
    pub subagent_id: String,
    pub agent_name: String,
    pub status: SubagentStatus,

    /// Last assistant message, prefixed with the subagent marker
    #[serde(default)]
    pub output: String,

    #[serde(default)]
    pub findings: Vec<String>,

    pub actions_taken: u32,
    pub duration: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubagentResult {
    pub fn failed(
        subagent_id: impl Into<String>,
        agent_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            subagent_id: subagent_id.into(),
            agent_name: agent_name.into(),
            status: SubagentStatus::Failed,
            output: String::new(),
            findings: Vec::new(),
            actions_taken: 0,
            duration: Duration::ZERO,
            error: Some(error.into()),
        }
    }
}

/// Persisted view of an investigation, keyed by run id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationRecord {
    pub id: String,
    pub alert_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    pub status: InvestigationStatus,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub findings: Vec<String>,

    #[serde(default)]
    pub actions_taken: u32,

    #[serde(default)]
    pub duration_ms: u64,

    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub escalated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
}

impl InvestigationRecord {
    /// A fresh record for a run that has just been registered.
    pub fn started(id: impl Into<String>, alert_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alert_id: alert_id.into(),
            session_id: None,
            status: InvestigationStatus::Started,
            started_at: Utc::now(),
            completed_at: None,
            findings: Vec::new(),
            actions_taken: 0,
            duration_ms: 0,
            confidence: 0.0,
            escalated: false,
            escalation_reason: None,
        }
    }

    /// Fold a terminal result into this record.
    pub fn apply_result(&mut self, result: &InvestigationResult, session_id: Option<&str>) {
        if let Some(session) = session_id {
            self.session_id = Some(session.to_string());
        }
        self.status = result.status;
        self.completed_at = Some(Utc::now());
        self.findings = result.findings.clone();
        self.actions_taken = result.actions_taken;
        self.duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX);
        self.confidence = result.confidence;
        self.escalated = result.escalated;
        self.escalation_reason = result.escalation_reason.clone();
    }

    /// Mark this record as stopped on request.
    pub fn mark_stopped(&mut self) {
        self.status = InvestigationStatus::Stopped;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(InvestigationStatus::Escalated.to_string(), "escalated");
        assert!(!InvestigationStatus::Started.is_terminal());
        assert!(InvestigationStatus::Stopped.is_terminal());
    }

    #[test]
    fn failed_result_carries_error() {
        let result = InvestigationResult::failed("inv-1", "a1", "boom");
        assert_eq!(result.status, InvestigationStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.actions_taken, 0);
    }

    #[test]
    fn record_applies_result() {
        let mut record = InvestigationRecord::started("inv-1", "a1");
        let mut result = InvestigationResult::failed("inv-1", "a1", "x");
        result.status = InvestigationStatus::Completed;
        result.findings = vec!["disk full".into()];
        result.actions_taken = 3;
        result.duration = Duration::from_millis(1500);
        result.confidence = 0.8;

        record.apply_result(&result, Some("session-9"));
        assert_eq!(record.status, InvestigationStatus::Completed);
        assert_eq!(record.session_id.as_deref(), Some("session-9"));
        assert_eq!(record.findings, vec!["disk full".to_string()]);
        assert_eq!(record.duration_ms, 1500);
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn record_serialization_skips_empty_options() {
        let record = InvestigationRecord::started("inv-1", "a1");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"started\""));
        assert!(!json.contains("session_id"));
    }
}
