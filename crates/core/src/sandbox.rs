//! Sandbox trait: the remote development environment tools act on.
//!
//! Implementations are assumed to fail with [`SandboxError`] on transport
//! problems. Nothing here is atomic across files: a multi-file write is a
//! sequence of independent `write_file` calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SandboxError;

/// Captured output of a sandbox command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// A human-readable name for this sandbox (e.g., "local", "e2b").
    fn name(&self) -> &str;

    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;
}
