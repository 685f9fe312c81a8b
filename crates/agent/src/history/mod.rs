//! History Compactor: turns the durable message log into the bounded,
//! de-duplicated view that is sent to the model.
//!
//! The durable log is never modified here. Every stage works on copies:
//!
//! 1. collapse system messages to the single canonical one
//! 2. drop repeated user/assistant messages and echoed tool results
//! 3. repair tool-call / tool-result pairing
//! 4. detect repetition loops (on the collapsed, unfiltered log)
//! 5. compact to `max_length` when still oversized

pub mod compact;
pub mod dedupe;
pub mod normalize;
pub mod pairing;
pub mod repetition;

use std::sync::Arc;

use sandpiper_config::HistoryConfig;
use sandpiper_core::message::{Message, Role};

pub use compact::compact_if_oversized;
pub use dedupe::{
    ToolResultRules, collapse_system_messages, deduplicate_repeats, deduplicate_tool_results,
};
pub use pairing::{PairingStats, repair_pairing};
pub use repetition::{LoopClass, LoopReport, LoopRules, detect_repetition_loop};

use crate::policy::{OutcomeSignals, SignalPolicy};
use crate::prompts;

/// Heading under which an unseen read snapshot is appended to the system message.
pub const SNAPSHOT_HEADING: &str = "## Most recent file read";

/// All compactor knobs, resolved from [`HistoryConfig`].
#[derive(Debug, Clone, Copy)]
pub struct HistoryRules {
    pub max_duplicates: usize,
    pub recent_window: usize,
    pub tool_results: ToolResultRules,
    pub loops: LoopRules,
    pub max_length: usize,
    pub recent_tail: usize,
    pub milestone_limit: usize,
    pub tool_call_context_limit: usize,
}

impl Default for HistoryRules {
    fn default() -> Self {
        Self::from_config(&HistoryConfig::default())
    }
}

impl HistoryRules {
    pub fn from_config(config: &HistoryConfig) -> Self {
        Self {
            max_duplicates: config.max_duplicates,
            recent_window: config.recent_window,
            tool_results: ToolResultRules {
                window: config.tool_result_window,
                write_suppress_turns: config.write_suppress_turns,
                read_suppress_turns: config.read_suppress_turns,
            },
            loops: LoopRules {
                threshold: config.loop_threshold,
                window: config.loop_window,
            },
            max_length: config.max_length,
            recent_tail: config.recent_tail,
            milestone_limit: config.milestone_limit,
            tool_call_context_limit: config.tool_call_context_limit,
        }
    }
}

/// Duplicate suppression followed by a pairing repair.
pub fn deduplicate(log: &[Message], rules: &HistoryRules, signals: &dyn SignalPolicy) -> Vec<Message> {
    let repeats = deduplicate_repeats(log, rules.max_duplicates, rules.recent_window);
    let results = deduplicate_tool_results(&repeats, rules.tool_results, signals);
    let (paired, stats) = repair_pairing(results);
    if stats.changed() {
        tracing::debug!(
            dropped_tool_messages = stats.dropped_tool_messages,
            stripped_tool_calls = stats.stripped_tool_calls,
            dropped_assistants = stats.dropped_assistants,
            "Repaired tool-call pairing"
        );
    }
    paired
}

/// The model's view of one turn plus what was observed while building it.
#[derive(Debug, Clone)]
pub struct HistoryView {
    pub messages: Vec<Message>,
    pub report: LoopReport,
    /// Durable messages that did not make it into the view.
    pub omitted: usize,
    pub compacted: bool,
}

pub struct Compactor {
    rules: HistoryRules,
    signals: Arc<dyn SignalPolicy>,
}

impl Default for Compactor {
    fn default() -> Self {
        Self::new(HistoryRules::default())
    }
}

impl Compactor {
    pub fn new(rules: HistoryRules) -> Self {
        Self {
            rules,
            signals: Arc::new(OutcomeSignals),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(HistoryRules::from_config(config))
    }

    pub fn with_signals(mut self, signals: Arc<dyn SignalPolicy>) -> Self {
        self.signals = signals;
        self
    }

    pub fn rules(&self) -> &HistoryRules {
        &self.rules
    }

    pub fn signals(&self) -> &dyn SignalPolicy {
        self.signals.as_ref()
    }

    /// Build the model view of `log`.
    pub fn prepare(&self, log: &[Message]) -> HistoryView {
        let signals = self.signals.as_ref();
        let collapsed = collapse_system_messages(log, prompts::is_canonical_system);
        let report = detect_repetition_loop(&collapsed, self.rules.loops, signals);

        let filtered = deduplicate(&collapsed, &self.rules, signals);
        let compacted = filtered.len() > self.rules.max_length;
        let messages = compact_if_oversized(&filtered, &self.rules, signals);

        let omitted = log.len().saturating_sub(messages.len());
        if compacted {
            tracing::debug!(
                log_len = log.len(),
                view_len = messages.len(),
                max_length = self.rules.max_length,
                "Compacted history view"
            );
        }

        HistoryView {
            messages,
            report,
            omitted,
            compacted,
        }
    }
}

/// Make the latest read result visible when filtering removed it.
///
/// Returns `false` when some tool message in the view already carries it.
pub fn inject_read_snapshot(messages: &mut Vec<Message>, snapshot: &str) -> bool {
    if snapshot.trim().is_empty()
        || messages
            .iter()
            .any(|m| m.role == Role::Tool && m.content.contains(snapshot))
    {
        return false;
    }

    let block = format!("{SNAPSHOT_HEADING}\n\n{snapshot}");
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content = format!("{}\n\n{block}", first.content);
        }
        _ => messages.insert(0, Message::system(block)),
    }
    true
}
