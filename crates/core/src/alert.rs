//! The alert being investigated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alert severity. Unrecognised values deserialize as [`Severity::Unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of an alert for the lifetime of an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertView {
    pub id: String,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl AlertView {
    pub fn new(id: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            source: String::new(),
            severity,
            title: String::new(),
            description: String::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_predicate() {
        assert!(AlertView::new("a1", Severity::Critical).is_critical());
        assert!(!AlertView::new("a2", Severity::Warning).is_critical());
    }

    #[test]
    fn unknown_severity_is_tolerated() {
        let alert: AlertView =
            serde_json::from_str(r#"{"id":"a1","severity":"page-everyone"}"#).unwrap();
        assert_eq!(alert.severity, Severity::Unknown);
        assert!(alert.labels.is_empty());
    }

    #[test]
    fn parses_full_alert() {
        let alert: AlertView = serde_json::from_str(
            r#"{
                "id": "a1",
                "source": "prometheus",
                "severity": "critical",
                "title": "DiskFull",
                "description": "disk at 98%",
                "labels": {"host": "db-1"}
            }"#,
        )
        .unwrap();
        assert!(alert.is_critical());
        assert_eq!(alert.labels.get("host").map(String::as_str), Some("db-1"));
    }
}
