//! Prompt construction port.

use crate::alert::AlertView;
use crate::provider::ToolDefinition;
use crate::skill::SkillDescriptor;
use crate::subagent::SubagentDefinition;

/// Builds system prompts. The tool list passed in is already filtered by the
/// run's allow-list.
pub trait PromptBuilder: Send + Sync {
    fn investigation_prompt(
        &self,
        alert: &AlertView,
        tools: &[ToolDefinition],
        skills: &[SkillDescriptor],
    ) -> crate::Result<String>;

    fn subagent_prompt(
        &self,
        agent: &SubagentDefinition,
        tools: &[ToolDefinition],
        skills: &[SkillDescriptor],
    ) -> crate::Result<String>;
}
