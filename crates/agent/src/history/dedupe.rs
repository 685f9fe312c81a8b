//! System-message collapse and duplicate suppression.

use std::collections::{HashMap, VecDeque};

use sandpiper_core::message::{Message, Role};
use sandpiper_core::tool::ToolOutcome;

use super::normalize::{ContentHash, content_hash, message_hash, raw_hash};
use crate::policy::SignalPolicy;
use sandpiper_tools::invocation::{READ_FILES, WRITE_FILES};

/// Windows for the tool-result rules.
#[derive(Debug, Clone, Copy)]
pub struct ToolResultRules {
    /// Identical `(tool, hash)` results within this many prior results are dropped.
    pub window: usize,
    /// Turns during which an identical write to the same path is suppressed.
    pub write_suppress_turns: usize,
    /// Turns during which an identical read of the same path is suppressed.
    pub read_suppress_turns: usize,
}

impl Default for ToolResultRules {
    fn default() -> Self {
        Self {
            window: 5,
            write_suppress_turns: 8,
            read_suppress_turns: 10,
        }
    }
}

/// Keep the first canonical system message, moved to the front, and drop
/// every other system message. Non-system messages keep their order.
pub fn collapse_system_messages(
    log: &[Message],
    is_canonical: impl Fn(&Message) -> bool,
) -> Vec<Message> {
    let canonical = log
        .iter()
        .find(|m| m.role == Role::System && is_canonical(*m))
        .cloned();

    let mut out = Vec::with_capacity(log.len());
    out.extend(canonical);
    out.extend(log.iter().filter(|m| m.role != Role::System).cloned());
    out
}

/// Drop user and assistant messages whose normalized hash already appeared
/// at least `max_duplicates` times among the previous `recent_window`
/// entries. Other roles pass through.
pub fn deduplicate_repeats(
    log: &[Message],
    max_duplicates: usize,
    recent_window: usize,
) -> Vec<Message> {
    let keys: Vec<Option<(Role, ContentHash)>> = log
        .iter()
        .map(|m| match m.role {
            Role::User | Role::Assistant => Some((m.role, message_hash(m))),
            _ => None,
        })
        .collect();

    log.iter()
        .enumerate()
        .filter(|(i, _)| {
            let Some(key) = keys[*i] else { return true };
            let from = i.saturating_sub(recent_window);
            let seen = keys[from..*i].iter().filter(|k| **k == Some(key)).count();
            seen < max_duplicates
        })
        .map(|(_, m)| m.clone())
        .collect()
}

/// Drop echoed tool results.
///
/// A successful write is dropped only when every path it touched had an
/// identical successful write within `write_suppress_turns`. Other
/// completion signals are always kept. Read results compare file content
/// exactly, so a changed file is never mistaken for an unchanged one.
pub fn deduplicate_tool_results(
    log: &[Message],
    rules: ToolResultRules,
    signals: &dyn SignalPolicy,
) -> Vec<Message> {
    let mut out = Vec::with_capacity(log.len());
    let mut window: VecDeque<(String, ContentHash)> = VecDeque::with_capacity(rules.window);
    let mut last_write: HashMap<String, (usize, ContentHash)> = HashMap::new();
    let mut last_read: HashMap<String, (usize, ContentHash)> = HashMap::new();
    let mut turn = 0usize;

    for msg in log {
        match msg.role {
            Role::Assistant => {
                turn += 1;
                out.push(msg.clone());
                continue;
            }
            Role::Tool => {}
            _ => {
                out.push(msg.clone());
                continue;
            }
        }

        let tool = msg.tool_name.clone().unwrap_or_default();
        let paths = msg.paths();
        let outcome = msg.outcome();
        let is_read = tool == READ_FILES && outcome == Some(ToolOutcome::ReadSuccess);
        let is_write = tool == WRITE_FILES
            && matches!(outcome, Some(ToolOutcome::WriteSuccess | ToolOutcome::NoChanges));
        let hash = if is_read {
            raw_hash(&msg.content)
        } else {
            content_hash(&msg.content)
        };
        let key = (tool, hash);

        let keep = if is_write && !paths.is_empty() {
            !suppressed(&last_write, &paths, turn, hash, rules.write_suppress_turns)
        } else if signals.is_completion_signal(msg) {
            true
        } else if window.contains(&key) {
            false
        } else if is_read && !paths.is_empty() {
            !suppressed(&last_read, &paths, turn, hash, rules.read_suppress_turns)
        } else {
            true
        };

        if !keep {
            continue;
        }

        if is_write {
            for path in &paths {
                last_write.insert(path.clone(), (turn, hash));
            }
        }
        if is_read {
            for path in &paths {
                last_read.insert(path.clone(), (turn, hash));
            }
        }
        if rules.window > 0 {
            if window.len() == rules.window {
                window.pop_front();
            }
            window.push_back(key);
        }
        out.push(msg.clone());
    }
    out
}

/// Every path has a prior identical result within `turns`.
fn suppressed(
    last: &HashMap<String, (usize, ContentHash)>,
    paths: &[String],
    turn: usize,
    hash: ContentHash,
    turns: usize,
) -> bool {
    paths.iter().all(|p| {
        last.get(p)
            .is_some_and(|(at, h)| *h == hash && turn.saturating_sub(*at) <= turns)
    })
}
