//! Safety policy port.
//!
//! The loop consults an enforcer at fixed points; the enforcer itself holds no
//! per-run state. Every check is a pure function of the policy and its input.
//! When no enforcer is configured the loop treats every check as passing.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::PolicyError;
use crate::subagent::SubagentDefinition;

pub trait SafetyEnforcer: Send + Sync {
    /// Whether the named tool may be executed at all.
    fn check_tool_allowed(&self, tool_name: &str) -> Result<(), PolicyError>;

    /// Whether a shell command string is acceptable.
    fn check_command(&self, command: &str) -> Result<(), PolicyError>;

    /// Whether `actions_taken` is still within the action budget.
    fn check_action_budget(&self, actions_taken: u32) -> Result<(), PolicyError>;

    /// Whether the run's context is still live and within its deadline.
    fn check_timeout(&self, ctx: &ExecutionContext) -> Result<(), PolicyError>;
}

/// Builds the enforcer for one delegated run, so a definition's own
/// allow-list and budget are what the gate checks.
pub trait SubagentSafety: Send + Sync {
    fn for_definition(&self, agent: &SubagentDefinition) -> Arc<dyn SafetyEnforcer>;
}
