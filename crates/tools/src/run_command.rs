//! `run_command`: execute a shell command in the sandbox.
//!
//! Success is exit code 0. Package installs are additionally checked
//! against the project manifest before they are reported as done.

use sandpiper_core::sandbox::{CommandOutput, Sandbox};
use sandpiper_core::tool::{INSTALL_UNVERIFIED_PHRASE, INSTALL_VERIFIED_PHRASE, ToolOutcome};
use tracing::{debug, warn};

use crate::install::{self, Verification};
use crate::report::ToolReport;

/// Output beyond this many bytes is cut from the middle.
pub const MAX_OUTPUT_BYTES: usize = 16 * 1024;

pub async fn run_command(sandbox: &dyn Sandbox, command: &str) -> ToolReport {
    debug!(command = %command, sandbox = sandbox.name(), "Executing shell command");

    let output = match sandbox.run_command(command).await {
        Ok(output) => output,
        Err(e) => {
            warn!(command = %command, error = %e, "Command could not run");
            return ToolReport::new(
                format!("[exit code: -1]\nCommand could not be executed: {e}"),
                ToolOutcome::CommandFailed,
            );
        }
    };

    if !output.success() {
        warn!(command = %command, exit_code = output.exit_code, "Command failed");
        return ToolReport::new(format_output(&output), ToolOutcome::CommandFailed);
    }

    let installs = install::detect_installs(command);
    if installs.is_empty() {
        return ToolReport::new(format_output(&output), ToolOutcome::CommandSuccess);
    }

    let mut verified = Vec::new();
    let mut problems = Vec::new();
    let mut manifests = Vec::new();
    for request in &installs {
        match install::verify(sandbox, request).await {
            Verification::Verified { manifest, packages } => {
                verified.push(format!("{} in {manifest}", packages.join(", ")));
                manifests.push(manifest);
            }
            Verification::Missing { manifest, missing } => {
                problems.push(format!("missing from {manifest}: {}", missing.join(", ")));
                manifests.push(manifest);
            }
            Verification::ManifestUnreadable { manifest, reason } => {
                problems.push(format!("could not read {manifest}: {reason}"));
            }
        }
    }

    let body = format_output(&output);
    if problems.is_empty() {
        debug!(command = %command, "Install verified against manifest");
        ToolReport::new(
            format!("{INSTALL_VERIFIED_PHRASE}: {}\n{body}", verified.join("; ")),
            ToolOutcome::InstallVerified,
        )
        .with_paths(manifests)
    } else {
        warn!(command = %command, problems = ?problems, "Install not reflected in manifest");
        ToolReport::new(
            format!(
                "{INSTALL_UNVERIFIED_PHRASE}: {}. The command exited 0 but the manifest does \
                 not list the package; check the package name and the working directory.\n{body}",
                problems.join("; ")
            ),
            ToolOutcome::InstallUnverified,
        )
        .with_paths(manifests)
    }
}

/// Render command output the way the model sees it.
pub fn format_output(output: &CommandOutput) -> String {
    let text = if output.success() {
        if output.stderr.trim().is_empty() {
            output.stdout.clone()
        } else {
            format!("{}\n[stderr]: {}", output.stdout, output.stderr)
        }
    } else {
        format!(
            "[exit code: {}]\n{}\n{}",
            output.exit_code, output.stdout, output.stderr
        )
    };
    truncate_middle(text.trim(), MAX_OUTPUT_BYTES)
}

fn truncate_middle(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let half = max / 2;
    let mut head_end = half;
    while !text.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = text.len() - half;
    while !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    format!(
        "{}\n[... {} bytes omitted ...]\n{}",
        &text[..head_end],
        tail_start - head_end,
        &text[tail_start..]
    )
}
