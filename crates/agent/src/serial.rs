//! Per-thread serialization.
//!
//! A checkpoint is read once and written once per invocation, so two
//! invocations for the same thread must not overlap. Invocations for distinct
//! threads proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use sandpiper_core::message::ThreadId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct ThreadLocks {
    locks: Mutex<HashMap<ThreadId, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `thread_id`. Released when the guard drops.
    pub async fn acquire(&self, thread_id: &ThreadId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(thread_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Threads with an invocation running or queued.
    pub async fn active(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|l| Arc::strong_count(l) > 1)
            .count()
    }
}
