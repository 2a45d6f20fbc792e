//! Investigation and subagent execution loops for Vigil.
//!
//! Both runners share one cycle:
//!
//! 1. **Ask** the conversation service for the next assistant turn
//! 2. **Filter** its tool calls against the allow-list and remaining budget
//! 3. **Execute** regular calls through the safety gate, feed results back
//! 4. **Stop** on a completion or escalation signal, a final message without
//!    tool calls, a spent budget, or a cancelled or expired context
//!
//! [`AlertInvestigationUseCase`] sits on top and owns the registry of active
//! investigations: at most one per alert, optionally capped in total, and
//! stoppable at any time.

pub mod conversation;
pub mod delegation;
mod engine;
pub mod investigation_runner;
mod persistence;
pub mod prompt;
pub mod signals;
pub mod subagent_runner;
pub mod use_case;

#[cfg(test)]
mod test_helpers;

pub use conversation::ProviderConversationService;
pub use delegation::DelegatingExecutor;
pub use investigation_runner::{InvestigationRunner, RunOutcome};
pub use prompt::DefaultPromptBuilder;
pub use signals::{COMPLETE_TOOL, DELEGATE_TOOL, ESCALATE_TOOL};
pub use subagent_runner::SubagentRunner;
pub use use_case::{ActiveInvestigation, AlertInvestigationUseCase};
