//! The standard [`SafetyEnforcer`]: tool allow-list, blocked commands,
//! action budget and context deadline.
//!
//! Every check is a pure function of the policy and its input; refusals are
//! additionally recorded on the audit logger when one is attached.

use std::sync::Arc;

use vigil_config::{InvestigationConfig, SubagentConfig};
use vigil_core::context::ExecutionContext;
use vigil_core::error::PolicyError;
use vigil_core::safety::{SafetyEnforcer, SubagentSafety};
use vigil_core::subagent::SubagentDefinition;

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::command::CommandPolicy;

/// Policy values an enforcer checks against.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyPolicy {
    /// `None` = allow all, empty = block all
    pub allowed_tools: Option<Vec<String>>,
    pub commands: CommandPolicy,
    pub max_actions: u32,
}

impl SafetyPolicy {
    /// A policy with no allow-list, no blocked commands and the given budget.
    pub fn permissive(max_actions: u32) -> Self {
        Self {
            allowed_tools: None,
            commands: CommandPolicy::default(),
            max_actions,
        }
    }

    pub fn from_investigation(config: &InvestigationConfig) -> Self {
        Self {
            allowed_tools: config.allowed_tools.clone(),
            commands: CommandPolicy::new(&config.blocked_commands),
            max_actions: config.max_actions,
        }
    }

    pub fn from_subagent(config: &SubagentConfig) -> Self {
        Self {
            allowed_tools: config.allowed_tools.clone(),
            commands: CommandPolicy::new(&config.blocked_commands),
            max_actions: config.max_actions,
        }
    }

    /// The subagent config with a definition's allow-list and budget laid
    /// over it. Blocked commands always come from the config.
    pub fn for_definition(config: &SubagentConfig, agent: &SubagentDefinition) -> Self {
        let mut policy = Self::from_subagent(config);
        if let Some(allowed) = &agent.allowed_tools {
            policy.allowed_tools = Some(allowed.clone());
        }
        if let Some(max_actions) = agent.max_actions {
            policy.max_actions = max_actions;
        }
        policy
    }

    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        match &self.allowed_tools {
            None => true,
            Some(list) => list.iter().any(|t| t == tool_name),
        }
    }
}

/// Enforces a [`SafetyPolicy`] and audits every refusal.
#[derive(Debug)]
pub struct PolicyEnforcer {
    policy: SafetyPolicy,
    scope: String,
    audit: Option<Arc<AuditLogger>>,
}

impl PolicyEnforcer {
    pub fn new(policy: SafetyPolicy) -> Self {
        Self {
            policy,
            scope: "investigation".into(),
            audit: None,
        }
    }

    /// Label used as the actor of audit entries.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    fn deny(&self, event: AuditEvent, target: &str, error: PolicyError) -> PolicyError {
        tracing::debug!(scope = %self.scope, target, %error, "Safety check denied");
        if let Some(audit) = &self.audit {
            audit.log(
                event,
                &self.scope,
                target,
                AuditOutcome::Denied,
                Some(error.to_string()),
            );
        }
        error
    }
}

impl SafetyEnforcer for PolicyEnforcer {
    fn check_tool_allowed(&self, tool_name: &str) -> Result<(), PolicyError> {
        if self.policy.is_tool_allowed(tool_name) {
            return Ok(());
        }
        Err(self.deny(
            AuditEvent::ToolBlocked {
                tool_name: tool_name.to_string(),
            },
            tool_name,
            PolicyError::ToolNotAllowed(tool_name.to_string()),
        ))
    }

    fn check_command(&self, command: &str) -> Result<(), PolicyError> {
        match self.policy.commands.find_blocked(command) {
            None => Ok(()),
            Some(pattern) => Err(self.deny(
                AuditEvent::CommandBlocked {
                    pattern: pattern.to_string(),
                },
                command,
                PolicyError::CommandBlocked {
                    pattern: pattern.to_string(),
                },
            )),
        }
    }

    fn check_action_budget(&self, actions_taken: u32) -> Result<(), PolicyError> {
        let max = self.policy.max_actions;
        if actions_taken < max {
            return Ok(());
        }
        Err(self.deny(
            AuditEvent::BudgetExceeded {
                taken: actions_taken,
                max,
            },
            "actions",
            PolicyError::BudgetExceeded {
                taken: actions_taken,
                max,
            },
        ))
    }

    fn check_timeout(&self, ctx: &ExecutionContext) -> Result<(), PolicyError> {
        ctx.check().map_err(|error| {
            let event = match error {
                PolicyError::Cancelled => AuditEvent::Cancelled,
                _ => AuditEvent::Timeout,
            };
            self.deny(event, "deadline", error)
        })
    }
}

/// Builds a [`PolicyEnforcer`] per subagent definition.
#[derive(Debug)]
pub struct SubagentPolicies {
    config: SubagentConfig,
    audit: Option<Arc<AuditLogger>>,
}

impl SubagentPolicies {
    pub fn new(config: SubagentConfig) -> Self {
        Self {
            config,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }
}

impl SubagentSafety for SubagentPolicies {
    fn for_definition(&self, agent: &SubagentDefinition) -> Arc<dyn SafetyEnforcer> {
        let mut enforcer = PolicyEnforcer::new(SafetyPolicy::for_definition(&self.config, agent))
            .with_scope(format!("subagent:{}", agent.name));
        if let Some(audit) = &self.audit {
            enforcer = enforcer.with_audit(Arc::clone(audit));
        }
        Arc::new(enforcer)
    }
}
