//! Default markdown system prompts.

use std::fmt::Write;

use vigil_core::alert::AlertView;
use vigil_core::prompt::PromptBuilder;
use vigil_core::provider::ToolDefinition;
use vigil_core::skill::SkillDescriptor;
use vigil_core::subagent::SubagentDefinition;

use crate::signals::{COMPLETE_TOOL, DELEGATE_TOOL, ESCALATE_TOOL};

/// Builds investigation and subagent prompts from structured input.
#[derive(Debug, Clone, Default)]
pub struct DefaultPromptBuilder {
    /// Extra operator guidance appended to every investigation prompt
    preamble: Option<String>,
}

impl DefaultPromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }
}

impl PromptBuilder for DefaultPromptBuilder {
    fn investigation_prompt(
        &self,
        alert: &AlertView,
        tools: &[ToolDefinition],
        skills: &[SkillDescriptor],
    ) -> vigil_core::Result<String> {
        let mut out = String::new();
        out.push_str(
            "You are an on-call site reliability engineer investigating a production alert. \
             Gather evidence with the tools available, find the most likely root cause, and \
             report it.\n\n",
        );

        out.push_str("## Alert\n");
        let _ = writeln!(out, "- id: {}", alert.id);
        let _ = writeln!(out, "- severity: {}", alert.severity);
        if !alert.source.is_empty() {
            let _ = writeln!(out, "- source: {}", alert.source);
        }
        if !alert.title.is_empty() {
            let _ = writeln!(out, "- title: {}", alert.title);
        }
        if !alert.description.is_empty() {
            let _ = writeln!(out, "- description: {}", alert.description);
        }
        if !alert.labels.is_empty() {
            out.push_str("- labels:\n");
            for (key, value) in &alert.labels {
                let _ = writeln!(out, "  - {key}: {value}");
            }
        }

        render_tools(&mut out, tools);
        render_skills(&mut out, skills);

        out.push_str("\n## Finishing\n");
        let _ = writeln!(
            out,
            "- When you know the cause, call `{COMPLETE_TOOL}` with your findings and a \
             confidence between 0 and 1."
        );
        let _ = writeln!(
            out,
            "- If a human must take over, call `{ESCALATE_TOOL}` with the reason."
        );
        out.push_str(
            "- If you answer without calling a tool, end with a line `confidence: <0..1>`.\n",
        );
        out.push_str(
            "- Prefer read-only commands. Never change the system you are investigating.\n",
        );

        if let Some(preamble) = &self.preamble {
            let _ = write!(out, "\n{preamble}\n");
        }
        Ok(out)
    }

    fn subagent_prompt(
        &self,
        agent: &SubagentDefinition,
        tools: &[ToolDefinition],
        skills: &[SkillDescriptor],
    ) -> vigil_core::Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "You are the `{}` specialist.", agent.name);
        if !agent.description.is_empty() {
            let _ = writeln!(out, "{}", agent.description);
        }
        if !agent.instructions.is_empty() {
            let _ = write!(out, "\n## Instructions\n{}\n", agent.instructions);
        }

        render_tools(&mut out, tools);
        render_skills(&mut out, skills);

        out.push_str("\n## Finishing\n");
        let _ = writeln!(
            out,
            "- Call `{COMPLETE_TOOL}` with your findings when the task is done."
        );
        let _ = writeln!(
            out,
            "- You cannot delegate: `{DELEGATE_TOOL}` is unavailable to you."
        );
        Ok(out)
    }
}

fn render_tools(out: &mut String, tools: &[ToolDefinition]) {
    out.push_str("\n## Tools\n");
    if tools.is_empty() {
        out.push_str("No tools are available. Reason from the information above.\n");
        return;
    }
    for tool in tools {
        let _ = writeln!(out, "- `{}`: {}", tool.name, tool.description);
    }
}

fn render_skills(out: &mut String, skills: &[SkillDescriptor]) {
    if skills.is_empty() {
        return;
    }
    out.push_str("\n## Skills\n");
    for skill in skills {
        match &skill.location {
            Some(location) => {
                let _ = writeln!(out, "- {}: {} ({location})", skill.name, skill.description);
            }
            None => {
                let _ = writeln!(out, "- {}: {}", skill.name, skill.description);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vigil_core::alert::Severity;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition::new(name, format!("{name} tool"), json!({}))
    }

    #[test]
    fn investigation_prompt_carries_alert_and_tools() {
        let alert = AlertView::new("a1", Severity::Critical)
            .with_title("DiskFull")
            .with_label("host", "db-1");
        let prompt = DefaultPromptBuilder::new()
            .investigation_prompt(&alert, &[tool("bash")], &[])
            .unwrap();

        assert!(prompt.contains("- id: a1"));
        assert!(prompt.contains("- severity: critical"));
        assert!(prompt.contains("  - host: db-1"));
        assert!(prompt.contains("`bash`"));
        assert!(prompt.contains(COMPLETE_TOOL));
        assert!(!prompt.contains("## Skills"));
    }

    #[test]
    fn skills_are_rendered() {
        let skills = vec![SkillDescriptor {
            name: "disk-triage".into(),
            description: "Find what fills a disk".into(),
            location: Some("skills/disk.md".into()),
        }];
        let prompt = DefaultPromptBuilder::new()
            .investigation_prompt(&AlertView::new("a1", Severity::Info), &[], &skills)
            .unwrap();
        assert!(prompt.contains("disk-triage: Find what fills a disk (skills/disk.md)"));
        assert!(prompt.contains("No tools are available"));
    }

    #[test]
    fn subagent_prompt_uses_instructions() {
        let agent = SubagentDefinition::new("log-reader", "Find the first error.");
        let prompt = DefaultPromptBuilder::new()
            .subagent_prompt(&agent, &[tool("read_file")], &[])
            .unwrap();
        assert!(prompt.contains("`log-reader` specialist"));
        assert!(prompt.contains("Find the first error."));
        assert!(prompt.contains("`read_file`"));
        assert!(prompt.contains("cannot delegate"));
    }
}
