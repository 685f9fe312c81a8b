//! Tool dispatch: repair, validate, execute, and report.
//!
//! Every call yields exactly one tool message, whether it ran, failed, or
//! could not be parsed. Within a batch, `write_files` calls run one at a
//! time in request order, each seeing the state left by the writes before
//! it. The reads and commands between them run concurrently with bounded
//! parallelism. Results come back in request order.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use sandpiper_core::error::ToolError;
use sandpiper_core::message::{Message, MessageToolCall};
use sandpiper_core::provider::ToolDefinition;
use sandpiper_core::sandbox::Sandbox;
use sandpiper_core::session::{SessionState, StateDelta};
use sandpiper_core::tool::{INVALID_ARGUMENTS_PHRASE, ToolOutcome};
use tracing::{debug, info, warn};

use crate::invocation::{ToolInvocation, ToolKind, tool_definitions};
use crate::read_files::read_files;
use crate::report::ToolReport;
use crate::run_command::run_command;
use crate::write_files::write_files;

/// Knobs for a dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum tool calls of one batch running at once.
    pub parallelism: usize,
    /// Treat file content differing only in whitespace as unchanged.
    pub whitespace_insensitive_compare: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            whitespace_insensitive_compare: false,
        }
    }
}

/// One dispatched call.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub message: Message,
    pub delta: StateDelta,
    pub outcome: ToolOutcome,
    pub duration_ms: u64,
}

pub struct ToolDispatcher {
    sandbox: Arc<dyn Sandbox>,
    options: DispatchOptions,
}

impl ToolDispatcher {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox,
            options: DispatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Tool schemas advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        tool_definitions()
    }

    /// Execute a single call against a snapshot of the session.
    pub async fn dispatch(&self, call: &MessageToolCall, state: &SessionState) -> Dispatched {
        let start = Instant::now();

        let report = match ToolInvocation::parse(call) {
            Ok((invocation, repairs)) => {
                if !repairs.is_empty() {
                    info!(tool = %call.name, call_id = %call.id, repairs = ?repairs, "Repaired tool arguments");
                }
                self.execute(invocation, state).await
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Rejected tool call");
                validation_failure(&call.name, &e)
            }
        };

        let outcome = report.outcome;
        let (message, delta) = report.into_message(&call.id, &call.name);
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(tool = %call.name, call_id = %call.id, outcome = %outcome, duration_ms, "Tool dispatched");

        Dispatched {
            message,
            delta,
            outcome,
            duration_ms,
        }
    }

    /// Execute a batch, preserving request order in the results.
    ///
    /// For any path, the last write of the batch is both what the sandbox
    /// holds and what the returned deltas record.
    pub async fn dispatch_batch(
        &self,
        calls: &[MessageToolCall],
        state: &SessionState,
    ) -> Vec<Dispatched> {
        let parallelism = self.options.parallelism.max(1);
        let mut state = state.clone();
        let mut results = Vec::with_capacity(calls.len());

        for group in calls.chunk_by(|a, b| !is_write(a) && !is_write(b)) {
            match group {
                [call] if is_write(call) => {
                    let dispatched = self.dispatch(call, &state).await;
                    state.apply(dispatched.delta.clone());
                    results.push(dispatched);
                }
                _ => {
                    let snapshot = &state;
                    let done: Vec<Dispatched> = stream::iter(group)
                        .map(|call| self.dispatch(call, snapshot))
                        .buffered(parallelism)
                        .collect()
                        .await;
                    results.extend(done);
                }
            }
        }
        results
    }

    async fn execute(&self, invocation: ToolInvocation, state: &SessionState) -> ToolReport {
        let sandbox = self.sandbox.as_ref();
        match invocation {
            ToolInvocation::RunCommand { command } => run_command(sandbox, &command).await,
            ToolInvocation::WriteFiles { files } => {
                write_files(
                    sandbox,
                    &files,
                    state,
                    self.options.whitespace_insensitive_compare,
                )
                .await
            }
            ToolInvocation::ReadFiles { paths } => read_files(sandbox, &paths).await,
        }
    }
}

fn is_write(call: &MessageToolCall) -> bool {
    ToolKind::from_name(&call.name) == Some(ToolKind::WriteFiles)
}

fn validation_failure(tool_name: &str, error: &ToolError) -> ToolReport {
    let content = match error {
        ToolError::UnknownTool(name) => format!(
            "{INVALID_ARGUMENTS_PHRASE}: unknown tool '{name}'. Available tools: {}.",
            ToolKind::ALL.map(|k| k.name()).join(", ")
        ),
        ToolError::InvalidArguments(reason) => {
            let expected = ToolKind::from_name(tool_name)
                .map(|k| format!(" Expected arguments like {}.", k.expected_shape()))
                .unwrap_or_default();
            format!(
                "{INVALID_ARGUMENTS_PHRASE} for {tool_name}: {reason}.{expected} \
                 Fix the arguments and call the tool again."
            )
        }
    };
    ToolReport::new(content, ToolOutcome::ValidationError)
}
