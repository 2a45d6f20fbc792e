//! Skill discovery port. Skills are advisory prompt additions; discovery
//! failures never abort a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

/// A discovered skill, rendered into the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,

    /// Where the skill's full instructions live, if anywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[async_trait]
pub trait SkillProvider: Send + Sync {
    async fn discover(&self, ctx: &ExecutionContext) -> crate::Result<Vec<SkillDescriptor>>;
}
