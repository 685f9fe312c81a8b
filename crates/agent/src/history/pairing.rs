//! Tool-call / tool-result pairing.
//!
//! Every filtering stage can separate a tool result from the assistant turn
//! that requested it. After each stage the view is normalized so that each
//! `tool` message answers a pending call of the nearest preceding assistant,
//! calls left unanswered are stripped from that assistant's copy, and an
//! assistant left with neither text nor calls is dropped.

use std::collections::HashSet;

use sandpiper_core::message::{Message, Role};

/// What a pairing pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PairingStats {
    pub dropped_tool_messages: usize,
    pub stripped_tool_calls: usize,
    pub dropped_assistants: usize,
}

impl PairingStats {
    pub fn changed(&self) -> bool {
        self.dropped_tool_messages > 0 || self.stripped_tool_calls > 0 || self.dropped_assistants > 0
    }
}

/// Normalize `messages` so tool results and requests pair up.
pub fn repair_pairing(messages: Vec<Message>) -> (Vec<Message>, PairingStats) {
    let mut stats = PairingStats::default();
    let mut normalized: Vec<Message> = Vec::with_capacity(messages.len());
    let mut pending: HashSet<String> = HashSet::new();
    let mut pending_assistant: Option<usize> = None;

    for msg in messages {
        match msg.role {
            Role::Tool => {
                let answered = msg
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| pending.remove(id));
                if answered {
                    normalized.push(msg);
                } else {
                    stats.dropped_tool_messages += 1;
                }
            }
            _ => {
                close_pending(&mut normalized, &mut pending, &mut pending_assistant, &mut stats);
                if msg.role == Role::Assistant && msg.has_tool_calls() {
                    pending.extend(msg.tool_calls.iter().map(|c| c.id.clone()));
                    pending_assistant = Some(normalized.len());
                }
                normalized.push(msg);
            }
        }
    }
    close_pending(&mut normalized, &mut pending, &mut pending_assistant, &mut stats);

    let before = normalized.len();
    normalized.retain(|m| {
        !(m.role == Role::Assistant && m.tool_calls.is_empty() && m.content.trim().is_empty())
    });
    stats.dropped_assistants = before - normalized.len();

    (normalized, stats)
}

/// Strip calls of the pending assistant that never got an answer.
fn close_pending(
    normalized: &mut [Message],
    pending: &mut HashSet<String>,
    pending_assistant: &mut Option<usize>,
    stats: &mut PairingStats,
) {
    if let Some(idx) = pending_assistant.take()
        && !pending.is_empty()
        && let Some(assistant) = normalized.get_mut(idx)
    {
        let before = assistant.tool_calls.len();
        assistant.tool_calls.retain(|c| !pending.contains(&c.id));
        stats.stripped_tool_calls += before - assistant.tool_calls.len();
    }
    pending.clear();
}

/// Start index of a tail of about `desired` messages that does not open on
/// an orphaned tool result.
///
/// The start moves back over leading tool results to include the assistant
/// that requested them; if that would grow the tail past `max`, it moves
/// forward past them instead.
pub fn tail_start(messages: &[Message], desired: usize, max: usize) -> usize {
    let len = messages.len();
    if desired == 0 || len == 0 {
        return len;
    }
    let start = len.saturating_sub(desired);

    let mut back = start;
    while back > 0 && messages[back].role == Role::Tool {
        back -= 1;
    }
    if len - back <= max.max(desired) {
        return back;
    }

    let mut forward = start;
    while forward < len && messages[forward].role == Role::Tool {
        forward += 1;
    }
    forward
}
