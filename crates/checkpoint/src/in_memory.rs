//! In-memory checkpoint store, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use sandpiper_core::checkpoint::{Checkpoint, CheckpointStore};
use sandpiper_core::error::CheckpointError;
use sandpiper_core::message::ThreadId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps checkpoints in a map keyed by thread id.
pub struct InMemoryCheckpointStore {
    threads: Arc<RwLock<HashMap<ThreadId, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of threads with a stored checkpoint.
    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.threads
            .write()
            .await
            .insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }
}
