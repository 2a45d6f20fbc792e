//! # Vigil Core
//!
//! Domain types, ports, and error definitions for the Vigil alert
//! investigation runtime. This crate has **no framework dependencies**: it
//! defines the domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the investigation loop is a trait here
//! (conversation sessions, tool execution, the AI provider, safety policy,
//! persistence, prompt construction, skill discovery). Implementations live
//! in their own crates, so the loop can be driven by real backends in
//! production and by scripted doubles in tests.

pub mod alert;
pub mod context;
pub mod conversation;
pub mod error;
pub mod event;
pub mod investigation;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod safety;
pub mod skill;
pub mod store;
pub mod subagent;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use alert::{AlertView, Severity};
pub use context::{ExecutionContext, SubagentContextInfo};
pub use conversation::{ConversationService, SessionId, Turn};
pub use error::{Error, PolicyError, RegistryError, Result, RunFailure};
pub use event::{DomainEvent, EventBus};
pub use investigation::{
    InvestigationRecord, InvestigationResult, InvestigationStatus, SubagentResult, SubagentStatus,
};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use prompt::PromptBuilder;
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use safety::{SafetyEnforcer, SubagentSafety};
pub use skill::{SkillDescriptor, SkillProvider};
pub use store::InvestigationStore;
pub use subagent::SubagentDefinition;
pub use tool::{SHELL_TOOL, Tool, ToolCall, ToolExecutor, ToolRegistry, ToolResult};
