//! A sandbox backed by a directory on the local machine.
//!
//! Commands run through `sh -c` with the root as working directory. File
//! paths are relative to the root; absolute paths and paths that climb out
//! with `..` are rejected.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sandpiper_core::error::SandboxError;
use sandpiper_core::sandbox::{CommandOutput, Sandbox};
use tokio::process::Command;
use tracing::debug;

pub struct LocalSandbox {
    root: PathBuf,
    command_timeout: Duration,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            command_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a sandbox-relative path under the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let relative = Path::new(path.trim());
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(SandboxError::PathRejected(format!(
                            "{path} escapes the sandbox root"
                        )));
                    }
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::PathRejected(format!(
                        "{path} is absolute; use a path relative to the project root"
                    )));
                }
            }
        }
        if depth == 0 {
            return Err(SandboxError::PathRejected(format!("{path} is not a file path")));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_root(&self) -> Result<(), SandboxError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SandboxError::Unavailable(format!("{}: {e}", self.root.display())))
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn name(&self) -> &str {
        "local"
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        self.ensure_root().await?;
        debug!(command = %command, root = %self.root.display(), "Running local command");

        let child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.command_timeout, child)
            .await
            .map_err(|_| SandboxError::Timeout {
                command: command.to_string(),
                timeout_secs: self.command_timeout.as_secs(),
            })?
            .map_err(|e| SandboxError::CommandFailed(e.to_string()))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let full = self.resolve(path)?;
        let write_failed = |e: std::io::Error| SandboxError::WriteFailed {
            path: path.to_string(),
            reason: e.to_string(),
        };
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        tokio::fs::write(&full, content).await.map_err(write_failed)?;
        debug!(path = %path, bytes = content.len(), "Wrote local file");
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| SandboxError::ReadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());
        sandbox.write_file("src/pages/index.html", "<h1>hi</h1>").await.unwrap();
        let back = sandbox.read_file("src/pages/index.html").await.unwrap();
        assert_eq!(back, "<h1>hi</h1>");
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());
        assert!(matches!(
            sandbox.write_file("../outside.txt", "x").await,
            Err(SandboxError::PathRejected(_))
        ));
        assert!(matches!(
            sandbox.read_file("/etc/passwd").await,
            Err(SandboxError::PathRejected(_))
        ));
        assert!(sandbox.write_file("a/../b.txt", "ok").await.is_ok());
    }

    #[tokio::test]
    async fn runs_commands_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path());
        sandbox.write_file("marker.txt", "present").await.unwrap();

        let out = sandbox.run_command("cat marker.txt").await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "present");

        let failed = sandbox.run_command("exit 3").await.unwrap();
        assert_eq!(failed.exit_code, 3);
    }

    #[tokio::test]
    async fn command_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path()).with_timeout(Duration::from_millis(100));
        let err = sandbox.run_command("sleep 5").await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
    }
}
