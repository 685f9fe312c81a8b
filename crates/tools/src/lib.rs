//! Tool layer for Sandpiper.
//!
//! The model can call three tools: `run_command`, `write_files` and
//! `read_files`. The [`ToolDispatcher`] repairs near-miss arguments,
//! executes calls against a [`Sandbox`](sandpiper_core::sandbox::Sandbox),
//! and turns every call into exactly one tool message plus a state delta.

pub mod dispatcher;
pub mod install;
pub mod invocation;
pub mod local_sandbox;
pub mod read_files;
pub mod repair;
pub mod report;
pub mod run_command;
pub mod write_files;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{DispatchOptions, Dispatched, ToolDispatcher};
pub use invocation::{FileSpec, ToolInvocation, ToolKind, tool_definitions};
pub use local_sandbox::LocalSandbox;
pub use report::ToolReport;
