//! Tool outcomes: the structured verdict attached to every tool result.
//!
//! The dispatcher tags each `tool` message with a [`ToolOutcome`]; the history
//! compactor and the completion detector read it back instead of re-parsing
//! free text. The phrases below are what the dispatcher writes into result
//! content, so logs persisted without metadata can still be classified.

use serde::{Deserialize, Serialize};

/// Prefix of a fully successful `write_files` result.
pub const WRITE_SUCCESS_PHRASE: &str = "Successfully wrote";

/// Content of an idempotent `write_files` result.
pub const NO_CHANGES_PHRASE: &str = "No changes needed";

/// Prefix of a verified package installation.
pub const INSTALL_VERIFIED_PHRASE: &str = "Installation verified";

/// Prefix of an installation whose manifest check failed.
pub const INSTALL_UNVERIFIED_PHRASE: &str = "Installation not verified";

/// Prefix of a partially applied `write_files` batch.
pub const PARTIAL_WRITE_PHRASE: &str = "Partial write";

/// Prefix of a validation failure rendered back to the model.
pub const INVALID_ARGUMENTS_PHRASE: &str = "Invalid arguments";

/// How a single tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// Every requested file was written.
    WriteSuccess,
    /// Every requested file already had the requested content.
    NoChanges,
    /// Some files were written before the sandbox failed.
    PartialWrite,
    /// Nothing was written.
    WriteFailed,
    ReadSuccess,
    ReadFailed,
    CommandSuccess,
    CommandFailed,
    /// A package install whose package shows up in the manifest.
    InstallVerified,
    /// A package install that claimed success but left the manifest untouched.
    InstallUnverified,
    /// The model sent arguments that could not be repaired.
    ValidationError,
    Other,
}

impl ToolOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteSuccess => "write_success",
            Self::NoChanges => "no_changes",
            Self::PartialWrite => "partial_write",
            Self::WriteFailed => "write_failed",
            Self::ReadSuccess => "read_success",
            Self::ReadFailed => "read_failed",
            Self::CommandSuccess => "command_success",
            Self::CommandFailed => "command_failed",
            Self::InstallVerified => "install_verified",
            Self::InstallUnverified => "install_unverified",
            Self::ValidationError => "validation_error",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "write_success" => Self::WriteSuccess,
            "no_changes" => Self::NoChanges,
            "partial_write" => Self::PartialWrite,
            "write_failed" => Self::WriteFailed,
            "read_success" => Self::ReadSuccess,
            "read_failed" => Self::ReadFailed,
            "command_success" => Self::CommandSuccess,
            "command_failed" => Self::CommandFailed,
            "install_verified" => Self::InstallVerified,
            "install_unverified" => Self::InstallUnverified,
            "validation_error" => Self::ValidationError,
            "other" => Self::Other,
            _ => return None,
        })
    }

    /// Best-effort classification of an untagged result body.
    pub fn infer_from_text(content: &str) -> Self {
        let trimmed = content.trim_start();
        if trimmed.starts_with(NO_CHANGES_PHRASE) {
            Self::NoChanges
        } else if trimmed.starts_with(WRITE_SUCCESS_PHRASE) {
            Self::WriteSuccess
        } else if trimmed.starts_with(INSTALL_VERIFIED_PHRASE) {
            Self::InstallVerified
        } else if trimmed.starts_with(INSTALL_UNVERIFIED_PHRASE) {
            Self::InstallUnverified
        } else if trimmed.starts_with(PARTIAL_WRITE_PHRASE) {
            Self::PartialWrite
        } else if trimmed.starts_with(INVALID_ARGUMENTS_PHRASE) {
            Self::ValidationError
        } else if trimmed.starts_with("[exit code:") {
            Self::CommandFailed
        } else {
            Self::Other
        }
    }

    /// A result that says the requested work is finished.
    pub fn is_completion_signal(&self) -> bool {
        matches!(self, Self::WriteSuccess | Self::NoChanges | Self::InstallVerified)
    }

    /// A result that records a real state change in the sandbox.
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            Self::WriteSuccess | Self::CommandSuccess | Self::InstallVerified
        )
    }

    /// Results preserved preferentially when the history is compacted.
    pub fn is_milestone(&self) -> bool {
        matches!(self, Self::WriteSuccess | Self::NoChanges | Self::InstallVerified)
    }
}

impl std::fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
