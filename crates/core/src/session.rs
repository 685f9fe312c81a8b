//! Per-thread session state and the deltas tool operations return.
//!
//! Tools never mutate [`SessionState`] directly. Each dispatch reads a
//! snapshot and returns a [`StateDelta`]; the loop controller folds the
//! deltas of a batch in request order, so for any path the last write in
//! the batch wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mutable state owned by the loop controller for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Path → last content written through `write_files`.
    #[serde(default)]
    pub written_files: BTreeMap<String, String>,

    /// Path → number of real sandbox writes (skipped writes do not count).
    #[serde(default)]
    pub revisions: BTreeMap<String, u32>,

    /// Most recent `read_files` block; lives for exactly one turn.
    #[serde(skip)]
    pub last_read_snapshot: Option<String>,

    #[serde(default)]
    pub main_task_completed: bool,

    #[serde(default)]
    pub has_pending_write_errors: bool,

    /// Model turns taken by the current invocation.
    #[serde(default)]
    pub turns_taken: u32,

    /// The last invocation hit the recursion limit.
    #[serde(default)]
    pub truncated: bool,

    /// Index in the durable log of the request that started the current task.
    /// Tool results before it belong to earlier tasks.
    #[serde(default)]
    pub task_start: usize,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tool delta into the state.
    pub fn apply(&mut self, delta: StateDelta) {
        for (path, content) in delta.written {
            *self.revisions.entry(path.clone()).or_insert(0) += 1;
            self.written_files.insert(path, content);
        }
        if let Some(snapshot) = delta.read_snapshot {
            self.last_read_snapshot = Some(snapshot);
        }
        if delta.task_completed {
            self.main_task_completed = true;
        }
        if let Some(pending) = delta.pending_write_errors {
            self.has_pending_write_errors = pending;
        }
    }

    /// Reset completion bookkeeping when a fresh, unrelated request arrives
    /// at `task_start` in the log.
    pub fn reset_for_new_task(&mut self, task_start: usize) {
        self.main_task_completed = false;
        self.has_pending_write_errors = false;
        self.task_start = task_start;
    }

    /// Take the staged read snapshot, leaving nothing behind for the next turn.
    pub fn take_read_snapshot(&mut self) -> Option<String> {
        self.last_read_snapshot.take()
    }

    /// The task is done and nothing is left in an unknown state.
    pub fn ready_to_summarize(&self) -> bool {
        self.main_task_completed && !self.has_pending_write_errors
    }
}

/// State changes produced by one tool dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDelta {
    /// Paths actually written in the sandbox, with their new content.
    pub written: Vec<(String, String)>,

    /// Block staged for injection into the next model context.
    pub read_snapshot: Option<String>,

    /// A write reported unambiguous success.
    pub task_completed: bool,

    /// `Some(true)` after a partial failure, `Some(false)` after a clean write.
    pub pending_write_errors: Option<bool>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
            && self.read_snapshot.is_none()
            && !self.task_completed
            && self.pending_write_errors.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_records_writes_and_revisions() {
        let mut state = SessionState::new();
        state.apply(StateDelta {
            written: vec![("a.ts".into(), "one".into())],
            task_completed: true,
            pending_write_errors: Some(false),
            ..Default::default()
        });
        state.apply(StateDelta {
            written: vec![("a.ts".into(), "two".into())],
            ..Default::default()
        });

        assert_eq!(state.written_files["a.ts"], "two");
        assert_eq!(state.revisions["a.ts"], 2);
        assert!(state.main_task_completed);
        assert!(state.ready_to_summarize());
    }

    #[test]
    fn pending_errors_block_summary() {
        let mut state = SessionState::new();
        state.apply(StateDelta {
            task_completed: true,
            pending_write_errors: Some(true),
            ..Default::default()
        });
        assert!(!state.ready_to_summarize());

        state.reset_for_new_task(7);
        assert!(!state.main_task_completed);
        assert!(!state.has_pending_write_errors);
        assert_eq!(state.task_start, 7);
    }

    #[test]
    fn read_snapshot_is_taken_once() {
        let mut state = SessionState::new();
        state.apply(StateDelta {
            read_snapshot: Some("=== a.ts ===\nx".into()),
            ..Default::default()
        });
        assert!(state.take_read_snapshot().is_some());
        assert!(state.take_read_snapshot().is_none());
    }

    #[test]
    fn snapshot_is_not_persisted() {
        let mut state = SessionState::new();
        state.last_read_snapshot = Some("transient".into());
        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("transient"));
    }
}
