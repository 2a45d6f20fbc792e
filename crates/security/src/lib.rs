//! Security module for Vigil: safety policy enforcement and audit logging.
//!
//! Provides:
//! - **Policy**: the [`SafetyEnforcer`](vigil_core::SafetyEnforcer) used by
//!   investigation and subagent loops (tool allow-list, action budget, deadline)
//! - **Commands**: blocked-pattern matching for shell command strings
//! - **Audit logging**: structured records of every refusal

pub mod audit;
pub mod command;
pub mod policy;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use command::CommandPolicy;
pub use policy::{PolicyEnforcer, SafetyPolicy, SubagentPolicies};
