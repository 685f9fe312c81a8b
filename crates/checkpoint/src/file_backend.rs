//! File-based checkpoint store: one JSON document per thread.
//!
//! Storage location: `~/.sandpiper/threads/<hex of thread_id>.json`
//!
//! Each `put` writes the whole document to a sibling temp file and renames
//! it over the old one, so a crash mid-write leaves the previous checkpoint
//! intact.

use async_trait::async_trait;
use sandpiper_core::checkpoint::{Checkpoint, CheckpointStore};
use sandpiper_core::error::CheckpointError;
use sandpiper_core::message::ThreadId;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a thread id to a file name. Hex keeps the name filename-safe and
    /// distinct ids on distinct files.
    fn path_for(&self, thread_id: &ThreadId) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(thread_id.as_str())))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(thread_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CheckpointError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let checkpoint: Checkpoint =
            serde_json::from_str(&content).map_err(|e| CheckpointError::Corrupted {
                thread_id: thread_id.to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            thread_id = %thread_id,
            messages = checkpoint.messages.len(),
            "Loaded checkpoint"
        );
        Ok(Some(checkpoint))
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            CheckpointError::Storage(format!("Failed to create checkpoint directory: {e}"))
        })?;

        let path = self.path_for(&checkpoint.thread_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| CheckpointError::Storage(format!("Failed to serialize checkpoint: {e}")))?;

        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to write checkpoint: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to commit checkpoint: {e}")))?;

        debug!(
            thread_id = %checkpoint.thread_id,
            messages = checkpoint.messages.len(),
            path = %path.display(),
            "Wrote checkpoint"
        );
        Ok(())
    }
}
