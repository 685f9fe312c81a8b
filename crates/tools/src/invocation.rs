//! The closed set of tools the model may call.
//!
//! A model tool call is parsed into a [`ToolInvocation`] before anything runs;
//! adding or removing a tool means adding or removing a variant, and every
//! `match` over it is checked by the compiler.

use sandpiper_core::error::ToolError;
use sandpiper_core::message::MessageToolCall;
use sandpiper_core::provider::ToolDefinition;

use crate::repair;

pub const RUN_COMMAND: &str = "run_command";
pub const WRITE_FILES: &str = "write_files";
pub const READ_FILES: &str = "read_files";

/// Which tool a call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    RunCommand,
    WriteFiles,
    ReadFiles,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [Self::RunCommand, Self::WriteFiles, Self::ReadFiles];

    /// Resolve a tool name, tolerating hyphenated and camel-case spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .flat_map(|c| {
                if c == '-' {
                    vec!['_']
                } else if c.is_ascii_uppercase() {
                    vec!['_', c.to_ascii_lowercase()]
                } else {
                    vec![c]
                }
            })
            .collect();
        match normalized.trim_start_matches('_') {
            RUN_COMMAND => Some(Self::RunCommand),
            WRITE_FILES => Some(Self::WriteFiles),
            READ_FILES => Some(Self::ReadFiles),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RunCommand => RUN_COMMAND,
            Self::WriteFiles => WRITE_FILES,
            Self::ReadFiles => READ_FILES,
        }
    }

    /// The argument shape shown to the model when its call cannot be repaired.
    pub fn expected_shape(&self) -> &'static str {
        match self {
            Self::RunCommand => r#"{"command": "npm run build"}"#,
            Self::WriteFiles => r#"{"files": [{"path": "src/App.tsx", "content": "..."}]}"#,
            Self::ReadFiles => r#"{"files": ["src/App.tsx", "package.json"]}"#,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        match self {
            Self::RunCommand => ToolDefinition {
                name: RUN_COMMAND.into(),
                description: "Run a shell command in the sandbox and return its output. \
                              Package installs are verified against the project manifest."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "The shell command to execute"
                        }
                    },
                    "required": ["command"]
                }),
            },
            Self::WriteFiles => ToolDefinition {
                name: WRITE_FILES.into(),
                description: "Create or overwrite files in the sandbox. Files whose content \
                              is already identical are skipped."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "files": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "path": { "type": "string" },
                                    "content": { "type": "string" }
                                },
                                "required": ["path", "content"]
                            }
                        }
                    },
                    "required": ["files"]
                }),
            },
            Self::ReadFiles => ToolDefinition {
                name: READ_FILES.into(),
                description: "Read one or more files from the sandbox.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "files": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Paths to read"
                        }
                    },
                    "required": ["files"]
                }),
            },
        }
    }
}

/// Definitions for every tool, in a stable order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolKind::ALL.iter().map(ToolKind::definition).collect()
}

/// One file of a `write_files` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub path: String,
    pub content: String,
}

/// A validated, normalized tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    RunCommand { command: String },
    WriteFiles { files: Vec<FileSpec> },
    ReadFiles { paths: Vec<String> },
}

impl ToolInvocation {
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::RunCommand { .. } => ToolKind::RunCommand,
            Self::WriteFiles { .. } => ToolKind::WriteFiles,
            Self::ReadFiles { .. } => ToolKind::ReadFiles,
        }
    }

    /// Repair and validate a raw model tool call.
    ///
    /// Returns the invocation plus a note for every repair applied.
    pub fn parse(call: &MessageToolCall) -> Result<(Self, Vec<String>), ToolError> {
        let kind =
            ToolKind::from_name(&call.name).ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        repair::repair(kind, &call.arguments)
    }
}
