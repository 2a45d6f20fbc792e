//! Named subagent definitions.

use serde::{Deserialize, Serialize};

/// Model name meaning "keep whatever the parent run uses".
pub const INHERIT_MODEL: &str = "inherit";

/// A delegate-able specialist: identity, instructions and optional limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Role-specific instructions placed in the subagent's system prompt
    #[serde(default)]
    pub instructions: String,

    /// Model override; absent, empty or "inherit" keeps the active model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool allow-list; absent = all, empty = none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,

    /// Overrides the subagent config's action budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_actions: Option<u32>,
}

impl SubagentDefinition {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            model: None,
            allowed_tools: None,
            max_actions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    /// The model to switch to, if this definition requests one.
    pub fn model_override(&self) -> Option<&str> {
        match self.model.as_deref().map(str::trim) {
            None | Some("") | Some(INHERIT_MODEL) => None,
            Some(model) => Some(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherit_and_empty_mean_no_override() {
        let agent = SubagentDefinition::new("logs", "read logs");
        assert_eq!(agent.model_override(), None);
        assert_eq!(agent.clone().with_model("").model_override(), None);
        assert_eq!(agent.clone().with_model("inherit").model_override(), None);
        assert_eq!(agent.with_model("fast-model").model_override(), Some("fast-model"));
    }

    #[test]
    fn parses_from_toml_shape() {
        let agent: SubagentDefinition = serde_json::from_value(serde_json::json!({
            "name": "k8s",
            "instructions": "inspect pods",
            "allowed_tools": ["bash"]
        }))
        .unwrap();
        assert_eq!(agent.allowed_tools, Some(vec!["bash".to_string()]));
        assert!(agent.max_actions.is_none());
    }
}
