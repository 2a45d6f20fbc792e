//! Domain event system for decoupled observation of investigation lifecycles.
//!
//! Events are published when a run starts, executes or refuses a tool, and
//! finishes. Other components subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::investigation::{InvestigationStatus, SubagentStatus};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An investigation was registered
    InvestigationStarted {
        run_id: String,
        alert_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was executed (successfully or not)
    ToolExecuted {
        run_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was refused by the safety gate
    ToolBlocked {
        run_id: String,
        tool_name: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// An investigation reached its terminal state
    InvestigationFinished {
        run_id: String,
        alert_id: String,
        status: InvestigationStatus,
        actions_taken: u32,
        timestamp: DateTime<Utc>,
    },

    /// An investigation was stopped on request
    InvestigationStopped {
        run_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A delegated subtask finished
    SubagentFinished {
        subagent_id: String,
        agent_name: String,
        status: SubagentStatus,
        depth: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
