//! Swappable policy functions.
//!
//! Two heuristics drive the loop without being part of it: whether a fresh
//! user message starts a new task, and which tool results count as signals of
//! completion, progress, or milestones. Both are traits so a better
//! classifier can replace the keyword versions without touching the
//! state machine.

use sandpiper_core::message::{Message, Role};

/// How a fresh user message relates to the thread's prior work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A new piece of work; stale completion state must not carry over.
    NewTask,
    /// A nudge or status question about the current task.
    Continuation,
}

/// Classifies the most recent user message of a log.
pub trait TaskClassifier: Send + Sync {
    fn classify(&self, log: &[Message]) -> RequestKind;
}

/// Keyword heuristic: action verbs mean a new task, continuation phrases
/// without an action verb mean the same task.
#[derive(Debug, Clone)]
pub struct KeywordTaskClassifier {
    action_verbs: Vec<String>,
    continuation_phrases: Vec<String>,
}

const ACTION_VERBS: &[&str] = &[
    "add", "build", "change", "convert", "create", "delete", "design", "fix", "generate",
    "implement", "install", "make", "modify", "move", "refactor", "remove", "rename", "replace",
    "rewrite", "set", "update", "write",
];

const CONTINUATION_PHRASES: &[&str] = &[
    "continue",
    "keep going",
    "go on",
    "carry on",
    "proceed",
    "resume",
    "status",
    "are you done",
    "is it done",
    "next",
];

impl KeywordTaskClassifier {
    pub fn new() -> Self {
        Self {
            action_verbs: ACTION_VERBS.iter().map(|s| s.to_string()).collect(),
            continuation_phrases: CONTINUATION_PHRASES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_action_verbs(mut self, verbs: Vec<String>) -> Self {
        self.action_verbs = verbs;
        self
    }

    pub fn with_continuation_phrases(mut self, phrases: Vec<String>) -> Self {
        self.continuation_phrases = phrases;
        self
    }

    fn classify_text(&self, text: &str) -> RequestKind {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        if words.iter().any(|w| self.action_verbs.iter().any(|v| v == w)) {
            return RequestKind::NewTask;
        }
        let joined = words.join(" ");
        if self
            .continuation_phrases
            .iter()
            .any(|p| {
                joined == *p
                    || joined.starts_with(&format!("{p} "))
                    || joined.contains(&format!(" {p}"))
            })
        {
            return RequestKind::Continuation;
        }
        RequestKind::NewTask
    }
}

impl Default for KeywordTaskClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskClassifier for KeywordTaskClassifier {
    fn classify(&self, log: &[Message]) -> RequestKind {
        match log.iter().rev().find(|m| m.role == Role::User) {
            Some(msg) => self.classify_text(&msg.content),
            None => RequestKind::Continuation,
        }
    }
}

/// Decides what a tool result signals.
pub trait SignalPolicy: Send + Sync {
    /// The result says the requested work is finished.
    fn is_completion_signal(&self, msg: &Message) -> bool;
    /// The result records a real state change in the sandbox.
    fn is_progress(&self, msg: &Message) -> bool;
    /// The result should survive compaction preferentially.
    fn is_milestone(&self, msg: &Message) -> bool;
}

/// Reads the structured outcome on tool messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeSignals;

impl SignalPolicy for OutcomeSignals {
    fn is_completion_signal(&self, msg: &Message) -> bool {
        msg.outcome().is_some_and(|o| o.is_completion_signal())
    }

    fn is_progress(&self, msg: &Message) -> bool {
        msg.outcome().is_some_and(|o| o.is_progress())
    }

    fn is_milestone(&self, msg: &Message) -> bool {
        msg.outcome().is_some_and(|o| o.is_milestone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpiper_core::tool::ToolOutcome;

    fn classify(text: &str) -> RequestKind {
        KeywordTaskClassifier::new().classify(&[Message::user(text)])
    }

    #[test]
    fn action_verbs_start_new_tasks() {
        assert_eq!(classify("Add a dark mode toggle"), RequestKind::NewTask);
        assert_eq!(classify("change the header color to blue"), RequestKind::NewTask);
        assert_eq!(classify("write hello world on home page"), RequestKind::NewTask);
    }

    #[test]
    fn continuation_phrases_continue() {
        assert_eq!(classify("continue"), RequestKind::Continuation);
        assert_eq!(classify("Status?"), RequestKind::Continuation);
        assert_eq!(classify("please keep going"), RequestKind::Continuation);
    }

    #[test]
    fn action_verb_beats_continuation() {
        assert_eq!(classify("continue and add tests"), RequestKind::NewTask);
    }

    #[test]
    fn classifies_latest_user_message() {
        let log = vec![
            Message::user("create a landing page"),
            Message::assistant("done"),
            Message::user("continue"),
        ];
        assert_eq!(
            KeywordTaskClassifier::new().classify(&log),
            RequestKind::Continuation
        );
    }

    #[test]
    fn signals_read_outcome_metadata() {
        let policy = OutcomeSignals;
        let ok = Message::tool_result("c1", "write_files", "Successfully wrote 1 file(s): a")
            .with_outcome(ToolOutcome::WriteSuccess);
        let same = Message::tool_result("c2", "write_files", "No changes needed: a")
            .with_outcome(ToolOutcome::NoChanges);
        let build = Message::tool_result("c3", "run_command", "built")
            .with_outcome(ToolOutcome::CommandSuccess);

        assert!(policy.is_completion_signal(&ok));
        assert!(policy.is_completion_signal(&same));
        assert!(!policy.is_progress(&same));
        assert!(policy.is_progress(&build));
        assert!(!policy.is_completion_signal(&build));
        assert!(!policy.is_milestone(&Message::user("Successfully wrote")));
    }
}
