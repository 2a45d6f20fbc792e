//! Error types for the Vigil domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::fmt;
use thiserror::Error;

/// The top-level error type for all Vigil operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Conversation errors ---
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Safety policy violations ---
    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyError),

    // --- Investigation registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Input validation ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Prompt construction ---
    #[error("Prompt build failed: {0}")]
    Prompt(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error was caused by cancellation of the run's context.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Policy(PolicyError::Cancelled))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed run: the terminal result snapshot plus the error that ended it.
///
/// Runs always produce a result, even when they fail, so callers can inspect
/// status, findings and counters without first unpacking the error.
pub struct RunFailure<R> {
    pub result: R,
    pub error: Error,
}

impl<R> RunFailure<R> {
    pub fn new(result: R, error: impl Into<Error>) -> Self {
        Self {
            result,
            error: error.into(),
        }
    }

    /// Split into the result snapshot and the causing error.
    pub fn into_parts(self) -> (R, Error) {
        (self.result, self.error)
    }
}

impl<R> fmt::Debug for RunFailure<R>
where
    R: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunFailure")
            .field("result", &self.result)
            .field("error", &self.error)
            .finish()
    }
}

impl<R> fmt::Display for RunFailure<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run failed: {}", self.error)
    }
}

impl<R: fmt::Debug> std::error::Error for RunFailure<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ConversationError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Failed to open session: {0}")]
    OpenFailed(String),

    #[error("Completion request failed: {0}")]
    CompletionFailed(String),

    #[error("Conversation backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Violations reported by a safety enforcer or by the run's context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("tool '{0}' is not allowed by the safety policy")]
    ToolNotAllowed(String),

    #[error("command blocked by pattern '{pattern}'")]
    CommandBlocked { pattern: String },

    #[error("action budget exceeded: {taken} of {max} actions used")]
    BudgetExceeded { taken: u32, max: u32 },

    #[error("investigation timed out")]
    Timeout,

    #[error("run was cancelled")]
    Cancelled,

    #[error("every allowed tool is rejected by the safety policy")]
    AllToolsBlocked,
}

/// Errors raised by the active-investigation registry. No run is ever
/// started when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("alert {alert_id} already has an active investigation ({run_id})")]
    AlreadyRunning { alert_id: String, run_id: String },

    #[error("maximum concurrent investigations reached ({max})")]
    MaxConcurrentReached { max: usize },

    #[error("investigation not found: {0}")]
    NotFound(String),

    #[error("investigation service is shut down")]
    Shutdown,

    #[error("invalid alert: {0}")]
    InvalidAlert(String),
}
