use sandpiper_core::message::Message;
use sandpiper_core::session::StateDelta;
use sandpiper_core::tool::ToolOutcome;

/// What one tool execution produced, before it is bound to a call id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReport {
    pub content: String,
    pub outcome: ToolOutcome,
    /// Files the result refers to.
    pub paths: Vec<String>,
    pub delta: StateDelta,
}

impl ToolReport {
    pub fn new(content: impl Into<String>, outcome: ToolOutcome) -> Self {
        Self {
            content: content.into(),
            outcome,
            paths: Vec::new(),
            delta: StateDelta::default(),
        }
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_delta(mut self, delta: StateDelta) -> Self {
        self.delta = delta;
        self
    }

    /// Bind the report to the call that produced it.
    pub fn into_message(self, call_id: &str, tool_name: &str) -> (Message, StateDelta) {
        let mut message =
            Message::tool_result(call_id, tool_name, self.content).with_outcome(self.outcome);
        if !self.paths.is_empty() {
            message = message.with_paths(&self.paths);
        }
        (message, self.delta)
    }
}
