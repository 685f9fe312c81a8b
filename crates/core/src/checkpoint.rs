//! Checkpoint trait: the durable per-thread projection of history and state.
//!
//! A checkpoint is read once at the start of an invocation and written once
//! at the end. The store is passed into the agent loop by the caller, who
//! owns its connection lifecycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;
use crate::message::{Message, ThreadId};
use crate::session::SessionState;

/// The persisted {message log, session state} pair for a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: ThreadId,

    /// The unfiltered, append-only message log.
    pub messages: Vec<Message>,

    pub session: SessionState,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// A fresh checkpoint for a thread seen for the first time.
    pub fn new(thread_id: ThreadId) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            messages: Vec::new(),
            session: SessionState::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The core CheckpointStore trait.
///
/// Implementations: in-memory (for testing), JSON files.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    async fn get(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, CheckpointError>;

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}
