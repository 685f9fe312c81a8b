//! Message and thread domain types.
//!
//! A thread's history is an ordered log of [`Message`]s. The log is
//! append-only during an invocation; filtered views are derived from it
//! before every model call, but the durable log is never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolOutcome;

/// Metadata key holding the [`ToolOutcome`] of a tool-result message.
pub const META_OUTCOME: &str = "outcome";

/// Metadata key holding the sandbox paths a tool-result touched.
pub const META_PATHS: &str = "paths";

/// Unique identifier for a persisted conversation (the unit of checkpointing).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Task instructions
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content (possibly empty)
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, the tool that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Structured annotations (tool outcome, touched paths, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_name: None,
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message carrying tool-call requests.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content.into());
        msg.tool_calls = calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.tool_name = Some(tool_name.into());
        msg
    }

    /// Attach a structured outcome to a tool-result message.
    pub fn with_outcome(mut self, outcome: ToolOutcome) -> Self {
        self.metadata
            .insert(META_OUTCOME.into(), serde_json::Value::String(outcome.as_str().into()));
        self
    }

    /// Attach the list of sandbox paths a tool-result touched.
    pub fn with_paths(mut self, paths: &[String]) -> Self {
        self.metadata.insert(
            META_PATHS.into(),
            serde_json::Value::Array(
                paths
                    .iter()
                    .map(|p| serde_json::Value::String(p.clone()))
                    .collect(),
            ),
        );
        self
    }

    /// The recorded outcome of a tool result.
    ///
    /// Falls back to classifying the content text for messages that were
    /// persisted without metadata.
    pub fn outcome(&self) -> Option<ToolOutcome> {
        if self.role != Role::Tool {
            return None;
        }
        self.metadata
            .get(META_OUTCOME)
            .and_then(|v| v.as_str())
            .and_then(ToolOutcome::parse)
            .or_else(|| Some(ToolOutcome::infer_from_text(&self.content)))
    }

    /// Paths recorded on a tool result.
    pub fn paths(&self) -> Vec<String> {
        self.metadata
            .get(META_PATHS)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|p| p.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string (as emitted by the model, possibly malformed)
    pub arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
        assert!(msg.outcome().is_none());
    }

    #[test]
    fn tool_result_carries_name_and_call_id() {
        let msg = Message::tool_result("call_1", "write_files", "Wrote 1 file")
            .with_outcome(ToolOutcome::WriteSuccess)
            .with_paths(&["src/App.tsx".to_string()]);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.tool_name.as_deref(), Some("write_files"));
        assert_eq!(msg.outcome(), Some(ToolOutcome::WriteSuccess));
        assert_eq!(msg.paths(), vec!["src/App.tsx".to_string()]);
    }

    #[test]
    fn outcome_survives_serialization() {
        let msg = Message::tool_result("call_1", "write_files", "No changes needed")
            .with_outcome(ToolOutcome::NoChanges);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.outcome(), Some(ToolOutcome::NoChanges));
        assert_eq!(back.role, Role::Tool);
    }

    #[test]
    fn untagged_tool_result_outcome_is_inferred() {
        let msg = Message::tool_result("call_9", "run_command", "[exit code: 1]\nboom");
        assert_eq!(msg.outcome(), Some(ToolOutcome::CommandFailed));
    }

    #[test]
    fn thread_id_display() {
        let id = ThreadId::from("thread-42");
        assert_eq!(id.to_string(), "thread-42");
        assert_eq!(id.as_str(), "thread-42");
    }
}
