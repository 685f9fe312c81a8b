//! Shared test utilities for tool tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sandpiper_core::error::SandboxError;
use sandpiper_core::sandbox::{CommandOutput, Sandbox};

/// An in-memory sandbox with scripted command results.
#[derive(Default)]
pub struct FakeSandbox {
    pub files: Mutex<HashMap<String, String>>,
    /// Command → output. Unlisted commands succeed with empty output.
    pub commands: Mutex<HashMap<String, CommandOutput>>,
    pub fail_writes: Mutex<HashSet<String>>,
    /// Delays applied to successive `write_file` calls, in call order.
    pub write_delays: Mutex<VecDeque<Duration>>,
    pub writes: Mutex<Vec<String>>,
    pub ran: Mutex<Vec<String>>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files.lock().unwrap().insert(path.into(), content.into());
        self
    }

    pub fn with_command(self, command: &str, stdout: &str, exit_code: i32) -> Self {
        self.commands.lock().unwrap().insert(
            command.into(),
            CommandOutput {
                stdout: stdout.into(),
                stderr: String::new(),
                exit_code,
            },
        );
        self
    }

    pub fn failing_write(self, path: &str) -> Self {
        self.fail_writes.lock().unwrap().insert(path.into());
        self
    }

    pub fn with_write_delays(self, delays: &[Duration]) -> Self {
        self.write_delays.lock().unwrap().extend(delays.iter().copied());
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        self.ran.lock().unwrap().push(command.into());
        Ok(self
            .commands
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_default())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let delay = self.write_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.lock().unwrap().contains(path) {
            return Err(SandboxError::WriteFailed {
                path: path.into(),
                reason: "disk full".into(),
            });
        }
        self.writes.lock().unwrap().push(path.into());
        self.files.lock().unwrap().insert(path.into(), content.into());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::ReadFailed {
                path: path.into(),
                reason: "No such file or directory".into(),
            })
    }
}
