//! Size bounding for the model view.
//!
//! When the filtered log is longer than `max_length`, the view is rebuilt
//! from, in priority order: the canonical system message, the recent tail,
//! the most recent milestone results (each with the assistant turn that
//! requested it), the most recent complete tool-call exchanges, and the
//! latest user request if the tail has none. The result is at most
//! `max_length` plus the number of milestone results kept.

use std::collections::BTreeSet;

use sandpiper_core::message::{Message, Role};

use super::pairing::tail_start;
use super::{HistoryRules, deduplicate};
use crate::policy::SignalPolicy;

pub fn compact_if_oversized(
    log: &[Message],
    rules: &HistoryRules,
    signals: &dyn SignalPolicy,
) -> Vec<Message> {
    if log.len() <= rules.max_length {
        return log.to_vec();
    }

    let len = log.len();
    let body_start = usize::from(log.first().is_some_and(|m| m.role == Role::System));
    let budget = rules.max_length.saturating_sub(body_start);

    let body = &log[body_start..];
    let tail_from = body_start + tail_start(body, rules.recent_tail.min(budget), budget);

    let mut selected: BTreeSet<usize> = (tail_from..len).collect();
    if body_start == 1 {
        selected.insert(0);
    }
    let mut remaining = budget.saturating_sub(len - tail_from);

    // Milestones: the result rides free, its requesting assistant costs one.
    let mut milestones = 0usize;
    for idx in (body_start..tail_from).rev() {
        if milestones == rules.milestone_limit {
            break;
        }
        let msg = &log[idx];
        if msg.role != Role::Tool || !signals.is_milestone(msg) {
            continue;
        }
        let Some(requester) = requester_of(log, body_start, idx) else {
            continue;
        };
        if !selected.contains(&requester) {
            if remaining == 0 {
                continue;
            }
            remaining -= 1;
            selected.insert(requester);
        }
        selected.insert(idx);
        milestones += 1;
    }

    // Whole exchanges: the assistant plus every result answering it.
    let mut exchanges = 0usize;
    for idx in (body_start..tail_from).rev() {
        if exchanges == rules.tool_call_context_limit || remaining == 0 {
            break;
        }
        let msg = &log[idx];
        if msg.role != Role::Assistant || !msg.has_tool_calls() || selected.contains(&idx) {
            continue;
        }
        let results: Vec<usize> = (idx + 1..tail_from)
            .take_while(|i| log[*i].role == Role::Tool)
            .filter(|i| !selected.contains(i))
            .collect();
        let cost = 1 + results.len();
        if cost > remaining {
            continue;
        }
        remaining -= cost;
        selected.insert(idx);
        selected.extend(results);
        exchanges += 1;
    }

    let tail_has_user = log[tail_from..].iter().any(|m| m.role == Role::User);
    if !tail_has_user
        && remaining > 0
        && let Some(user) = (body_start..tail_from).rev().find(|i| log[*i].role == Role::User)
    {
        selected.insert(user);
    }

    let merged: Vec<Message> = selected.into_iter().map(|i| log[i].clone()).collect();
    deduplicate(&merged, rules, signals)
}

/// Index of the assistant whose calls include the result at `idx`.
fn requester_of(log: &[Message], from: usize, idx: usize) -> Option<usize> {
    let call_id = log[idx].tool_call_id.as_deref()?;
    (from..idx).rev().find(|i| {
        let m = &log[*i];
        m.role == Role::Assistant && m.tool_calls.iter().any(|c| c.id == call_id)
    })
}
