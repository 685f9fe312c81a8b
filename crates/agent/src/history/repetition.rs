//! Repetition-loop detection.
//!
//! Three message classes are examined independently: user messages by
//! content, tool results by `(tool, content)`, and assistant turns by the
//! signature of the tool calls they request. A class is looping when its most
//! recent value repeats at least `threshold` times in a row among its last
//! `window` entries.

use std::fmt;

use sandpiper_core::message::{Message, Role};

use super::normalize::{ContentHash, content_hash, tool_call_signature};
use crate::policy::SignalPolicy;

#[derive(Debug, Clone, Copy)]
pub struct LoopRules {
    pub threshold: usize,
    /// Entries per class examined, and messages searched for progress.
    pub window: usize,
}

impl Default for LoopRules {
    fn default() -> Self {
        Self {
            threshold: 3,
            window: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopClass {
    UserMessage,
    ToolResult,
    ToolCall,
}

impl fmt::Display for LoopClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserMessage => "user_message",
            Self::ToolResult => "tool_result",
            Self::ToolCall => "tool_call",
        })
    }
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub detected: bool,
    /// Detected and nothing in the recent window shows forward progress.
    pub terminal: bool,
    pub class: Option<LoopClass>,
    pub run_length: usize,
}

impl LoopReport {
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LoopKey {
    User(ContentHash),
    Tool(String, ContentHash),
    Calls(ContentHash),
}

pub fn detect_repetition_loop(
    log: &[Message],
    rules: LoopRules,
    signals: &dyn SignalPolicy,
) -> LoopReport {
    let threshold = rules.threshold.max(2);

    let users: Vec<LoopKey> = last_of_class(log, rules.window, |m| {
        (m.role == Role::User).then(|| LoopKey::User(content_hash(&m.content)))
    });
    let results: Vec<LoopKey> = last_of_class(log, rules.window, |m| {
        (m.role == Role::Tool).then(|| {
            LoopKey::Tool(m.tool_name.clone().unwrap_or_default(), content_hash(&m.content))
        })
    });
    let calls: Vec<LoopKey> = last_of_class(log, rules.window, |m| {
        if m.role == Role::Assistant {
            tool_call_signature(&m.tool_calls).map(LoopKey::Calls)
        } else {
            None
        }
    });

    let mut worst: Option<(LoopClass, usize, LoopKey)> = None;
    for (class, keys) in [
        (LoopClass::UserMessage, users),
        (LoopClass::ToolResult, results),
        (LoopClass::ToolCall, calls),
    ] {
        let (run, key) = match trailing_run(&keys) {
            Some(found) => found,
            None => continue,
        };
        if run >= threshold && worst.as_ref().is_none_or(|(_, best, _)| run > *best) {
            worst = Some((class, run, key));
        }
    }

    let Some((class, run_length, key)) = worst else {
        return LoopReport::none();
    };

    let start = log.len().saturating_sub(rules.window);
    let progressed = log[start..].iter().any(|m| {
        if !signals.is_progress(m) {
            return false;
        }
        match &key {
            LoopKey::Tool(tool, hash) => {
                m.tool_name.as_deref() != Some(tool.as_str()) || content_hash(&m.content) != *hash
            }
            _ => true,
        }
    });

    LoopReport {
        detected: true,
        terminal: !progressed,
        class: Some(class),
        run_length,
    }
}

/// Keys of the last `window` messages that belong to a class.
fn last_of_class(
    log: &[Message],
    window: usize,
    key: impl Fn(&Message) -> Option<LoopKey>,
) -> Vec<LoopKey> {
    let mut keys: Vec<LoopKey> = log.iter().rev().filter_map(&key).take(window).collect();
    keys.reverse();
    keys
}

/// Length of the run of identical keys at the end, and that key.
fn trailing_run(keys: &[LoopKey]) -> Option<(usize, LoopKey)> {
    let last = keys.last()?;
    let run = keys.iter().rev().take_while(|k| *k == last).count();
    Some((run, last.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::OutcomeSignals;
    use sandpiper_core::message::MessageToolCall;
    use sandpiper_core::tool::ToolOutcome;

    fn read_call(id: &str) -> Message {
        Message::assistant_with_calls(
            "",
            vec![MessageToolCall {
                id: id.into(),
                name: "read_files".into(),
                arguments: r#"{"files":["src/App.tsx"]}"#.into(),
            }],
        )
    }

    fn read_result(id: &str) -> Message {
        Message::tool_result(id, "read_files", "=== src/App.tsx ===\nexport default App;")
            .with_outcome(ToolOutcome::ReadSuccess)
    }

    #[test]
    fn repeated_user_message_is_detected() {
        let log: Vec<Message> = (0..5).map(|_| Message::user("Why is it broken?")).collect();
        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        assert!(report.detected);
        assert!(report.terminal);
        assert_eq!(report.class, Some(LoopClass::UserMessage));
        assert_eq!(report.run_length, 5);
    }

    #[test]
    fn varied_history_is_not_a_loop() {
        let log = vec![
            Message::user("build a page"),
            read_call("1"),
            read_result("1"),
            Message::assistant("done"),
        ];
        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        assert_eq!(report, LoopReport::none());
    }

    #[test]
    fn repeated_tool_exchanges_are_detected() {
        let mut log = vec![Message::user("fix it")];
        for i in 0..4 {
            let id = i.to_string();
            log.push(read_call(&id));
            log.push(read_result(&id));
        }
        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        assert!(report.detected);
        assert!(report.terminal);
        assert_eq!(report.run_length, 4);
    }

    #[test]
    fn recent_progress_makes_loop_non_terminal() {
        let mut log = vec![
            Message::user("fix it"),
            Message::assistant_with_calls(
                "",
                vec![MessageToolCall {
                    id: "w".into(),
                    name: "run_command".into(),
                    arguments: r#"{"command":"npm run build"}"#.into(),
                }],
            ),
            Message::tool_result("w", "run_command", "built")
                .with_outcome(ToolOutcome::CommandSuccess),
        ];
        for i in 0..3 {
            let id = i.to_string();
            log.push(read_call(&id));
            log.push(read_result(&id));
        }

        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        assert!(report.detected);
        assert_eq!(report.class, Some(LoopClass::ToolResult));
        assert!(!report.terminal);
    }

    #[test]
    fn repeated_progress_result_is_not_its_own_evidence() {
        let mut log = vec![Message::user("build")];
        for i in 0..4 {
            let id = i.to_string();
            log.push(Message::assistant_with_calls(
                "",
                vec![MessageToolCall {
                    id: id.clone(),
                    name: "run_command".into(),
                    arguments: r#"{"command":"npm run build"}"#.into(),
                }],
            ));
            log.push(
                Message::tool_result(&id, "run_command", "built in 2.1s")
                    .with_outcome(ToolOutcome::CommandSuccess),
            );
        }
        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        assert!(report.detected);
        assert!(report.terminal);
    }
}
