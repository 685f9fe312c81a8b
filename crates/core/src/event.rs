//! Domain events published by the agent loop.
//!
//! The agent loop publishes events as it moves between states; anything
//! interested (the CLI progress line, tests) subscribes and filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The loop entered `ASK_MODEL`
    TurnStarted {
        thread_id: String,
        turn: u32,
        forced_summary: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        thread_id: String,
        tool_name: String,
        outcome: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The history compactor found a repetition loop
    RepetitionDetected {
        thread_id: String,
        class: String,
        run_length: usize,
        terminal: bool,
        timestamp: DateTime<Utc>,
    },

    /// A model call failed and is being retried
    ModelRetried {
        thread_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// An invocation reached `END`
    InvocationFinished {
        thread_id: String,
        status: String,
        turns: u32,
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
