//! The Agent Loop Controller.
//!
//! One invocation walks `START → ASK_MODEL ⇄ RUN_TOOLS → END`. The thread's
//! checkpoint is read once before `START` and written once at `END`; a model
//! failure that survives the retry aborts the invocation without writing, so
//! the next one resumes from the last good checkpoint.

use std::sync::Arc;

use chrono::Utc;
use sandpiper_config::AppConfig;
use sandpiper_core::checkpoint::{Checkpoint, CheckpointStore};
use sandpiper_core::error::ProviderError;
use sandpiper_core::event::{DomainEvent, EventBus};
use sandpiper_core::message::{Message, MessageToolCall, Role, ThreadId};
use sandpiper_core::provider::{Provider, ProviderRequest, ProviderResponse};
use sandpiper_core::sandbox::Sandbox;
use sandpiper_tools::{DispatchOptions, ToolDispatcher};
use tracing::{debug, info, warn};

use crate::completion::{CompletionDetector, Verdict};
use crate::history::{Compactor, inject_read_snapshot};
use crate::policy::{KeywordTaskClassifier, RequestKind, TaskClassifier};
use crate::prompts;
use crate::serial::ThreadLocks;

/// One user request delivered by the transport.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub query: String,
    pub thread_id: ThreadId,
    /// Opaque transport session; logged, not interpreted.
    pub session_id: Option<String>,
}

impl TaskEvent {
    pub fn new(thread_id: ThreadId, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            thread_id,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// How an invocation reached `END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The model produced its summary block, possibly after being forced to.
    Completed,
    /// The model answered without tool calls and without the summary marker.
    ImplicitStop,
    /// The recursion limit was hit.
    Truncated { turns: u32 },
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ImplicitStop => "implicit_stop",
            Self::Truncated { .. } => "truncated",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `handle` returns to the transport.
#[derive(Debug, Clone)]
pub struct HandleOutcome {
    pub summary_text: String,
    pub thread_id: ThreadId,
    pub status: RunStatus,
}

/// The core agent loop that alternates model calls and tool dispatch.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    dispatcher: Arc<ToolDispatcher>,
    store: Arc<dyn CheckpointStore>,
    event_bus: Arc<EventBus>,
    compactor: Compactor,
    detector: CompletionDetector,
    classifier: Arc<dyn TaskClassifier>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,

    /// Maximum `ASK_MODEL` entries per invocation
    recursion_limit: u32,

    /// Extra attempts after a failed model call
    model_retries: u32,

    locks: ThreadLocks,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        dispatcher: Arc<ToolDispatcher>,
        store: Arc<dyn CheckpointStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            store,
            event_bus: Arc::new(EventBus::default()),
            compactor: Compactor::default(),
            detector: CompletionDetector::default(),
            classifier: Arc::new(KeywordTaskClassifier::new()),
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            recursion_limit: 40,
            model_retries: 1,
            locks: ThreadLocks::new(),
        }
    }

    /// Wire every knob from the application config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        sandbox: Arc<dyn Sandbox>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(sandbox).with_options(DispatchOptions {
            parallelism: config.tools.parallelism,
            whitespace_insensitive_compare: config.tools.whitespace_insensitive_compare,
        });

        Self::new(provider, Arc::new(dispatcher), store, &config.provider.model)
            .with_temperature(config.provider.temperature)
            .with_max_tokens(config.provider.max_tokens)
            .with_recursion_limit(config.agent.recursion_limit)
            .with_model_retries(config.agent.model_retries)
            .with_compactor(Compactor::from_config(&config.history))
            .with_detector(CompletionDetector::new(config.history.completion_lookback))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_model_retries(mut self, retries: u32) -> Self {
        self.model_retries = retries;
        self
    }

    pub fn with_compactor(mut self, compactor: Compactor) -> Self {
        self.compactor = compactor;
        self
    }

    pub fn with_detector(mut self, detector: CompletionDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TaskClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run one user request to `END`.
    pub async fn handle(&self, event: TaskEvent) -> sandpiper_core::Result<HandleOutcome> {
        let _guard = self.locks.acquire(&event.thread_id).await;

        let mut checkpoint = match self.store.get(&event.thread_id).await? {
            Some(checkpoint) => checkpoint,
            None => Checkpoint::new(event.thread_id.clone()),
        };
        info!(
            thread_id = %event.thread_id,
            session_id = ?event.session_id,
            messages = checkpoint.messages.len(),
            "Handling task"
        );

        self.begin(&mut checkpoint, &event.query);
        let status = self.run(&mut checkpoint).await?;

        checkpoint.session.truncated = matches!(status, RunStatus::Truncated { .. });
        checkpoint.updated_at = Utc::now();
        self.store.put(&checkpoint).await?;

        let turns = checkpoint.session.turns_taken.min(self.recursion_limit);
        info!(thread_id = %event.thread_id, status = %status, turns, "Invocation finished");
        self.event_bus.publish(DomainEvent::InvocationFinished {
            thread_id: event.thread_id.to_string(),
            status: status.to_string(),
            turns,
            timestamp: Utc::now(),
        });

        Ok(HandleOutcome {
            summary_text: summary_text(&checkpoint.messages, status),
            thread_id: event.thread_id,
            status,
        })
    }

    /// `START`: merge the request into the checkpointed history.
    fn begin(&self, checkpoint: &mut Checkpoint, query: &str) {
        if !checkpoint.messages.iter().any(prompts::is_canonical_system) {
            checkpoint.messages.insert(0, Message::system(prompts::system_prompt()));
        }
        checkpoint.messages.push(Message::user(query));

        let kind = self.classifier.classify(&checkpoint.messages);
        if kind == RequestKind::NewTask {
            let task_start = checkpoint.messages.len() - 1;
            checkpoint.session.reset_for_new_task(task_start);
        }
        debug!(thread_id = %checkpoint.thread_id, kind = ?kind, "Classified request");

        let session = &mut checkpoint.session;
        session.turns_taken = 0;
        session.truncated = false;
        session.last_read_snapshot = None;
    }

    async fn run(&self, checkpoint: &mut Checkpoint) -> sandpiper_core::Result<RunStatus> {
        let thread_id = checkpoint.thread_id.to_string();
        let mut last_response: Option<Message> = None;

        loop {
            // ASK_MODEL
            checkpoint.session.turns_taken += 1;
            let turn = checkpoint.session.turns_taken;
            if turn > self.recursion_limit {
                warn!(
                    thread_id = %thread_id,
                    limit = self.recursion_limit,
                    "Recursion limit reached, truncating invocation"
                );
                return Ok(RunStatus::Truncated {
                    turns: self.recursion_limit,
                });
            }

            let view = self.compactor.prepare(&checkpoint.messages);
            if view.report.detected {
                let class = view.report.class.map(|c| c.to_string()).unwrap_or_default();
                warn!(
                    thread_id = %thread_id,
                    class = %class,
                    run_length = view.report.run_length,
                    terminal = view.report.terminal,
                    "Repetition loop detected"
                );
                self.event_bus.publish(DomainEvent::RepetitionDetected {
                    thread_id: thread_id.clone(),
                    class,
                    run_length: view.report.run_length,
                    terminal: view.report.terminal,
                    timestamp: Utc::now(),
                });
            }

            let verdict = self.detector.evaluate(
                last_response.as_ref(),
                &checkpoint.session,
                &view.report,
                &checkpoint.messages,
            );

            let mut messages = view.messages;
            if let Some(snapshot) = checkpoint.session.take_read_snapshot()
                && inject_read_snapshot(&mut messages, &snapshot)
            {
                debug!(thread_id = %thread_id, "Injected read snapshot into view");
            }

            match verdict {
                Verdict::Stop => return Ok(RunStatus::Completed),
                Verdict::ForceSummary { reason } => {
                    info!(thread_id = %thread_id, turn, reason = %reason, "Forcing completion summary");
                    self.publish_turn(&thread_id, turn, true);
                    messages.push(Message::user(prompts::COMPLETION_FORCING_PROMPT));

                    let mut reply = self.ask(&thread_id, messages, false).await?;
                    reply.tool_calls.clear();
                    checkpoint.messages.push(reply);
                    return Ok(RunStatus::Completed);
                }
                Verdict::Continue => {}
            }

            self.publish_turn(&thread_id, turn, false);
            let mut reply = self.ask(&thread_id, messages, true).await?;

            if prompts::is_terminal_response(&reply) {
                reply.tool_calls.clear();
                checkpoint.messages.push(reply);
                return Ok(RunStatus::Completed);
            }
            if reply.tool_calls.is_empty() {
                debug!(thread_id = %thread_id, turn, "Response without tool calls, stopping");
                checkpoint.messages.push(reply);
                return Ok(RunStatus::ImplicitStop);
            }

            // RUN_TOOLS
            checkpoint.messages.push(reply.clone());
            self.run_tools(&thread_id, checkpoint, &reply.tool_calls).await;
            last_response = Some(reply);
        }
    }

    /// Dispatch a batch and fold the results back in request order.
    async fn run_tools(&self, thread_id: &str, checkpoint: &mut Checkpoint, calls: &[MessageToolCall]) {
        debug!(thread_id = %thread_id, tool_count = calls.len(), "Executing tool calls");
        let results = self.dispatcher.dispatch_batch(calls, &checkpoint.session).await;

        for dispatched in results {
            self.event_bus.publish(DomainEvent::ToolExecuted {
                thread_id: thread_id.to_string(),
                tool_name: dispatched.message.tool_name.clone().unwrap_or_default(),
                outcome: dispatched.outcome.to_string(),
                duration_ms: dispatched.duration_ms,
                timestamp: Utc::now(),
            });
            checkpoint.messages.push(dispatched.message);
            checkpoint.session.apply(dispatched.delta);
        }
    }

    /// Call the model, retrying failures with the unmodified request.
    async fn ask(
        &self,
        thread_id: &str,
        messages: Vec<Message>,
        with_tools: bool,
    ) -> sandpiper_core::Result<Message> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: if with_tools {
                self.dispatcher.definitions()
            } else {
                vec![]
            },
        };

        let attempts = self.model_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .provider
                .complete(request.clone())
                .await
                .and_then(check_response);

            match result {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        debug!(
                            thread_id = %thread_id,
                            model = %response.model,
                            total_tokens = usage.total_tokens,
                            "Model responded"
                        );
                    }
                    let mut message = response.message;
                    message.role = Role::Assistant;
                    return Ok(message);
                }
                Err(e) if attempt < attempts => {
                    warn!(thread_id = %thread_id, attempt, error = %e, "Model call failed, retrying");
                    self.event_bus.publish(DomainEvent::ModelRetried {
                        thread_id: thread_id.to_string(),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    warn!(thread_id = %thread_id, attempts, error = %e, "Model call failed, aborting invocation");
                    return Err(e.into());
                }
            }
        }
    }

    fn publish_turn(&self, thread_id: &str, turn: u32, forced_summary: bool) {
        self.event_bus.publish(DomainEvent::TurnStarted {
            thread_id: thread_id.to_string(),
            turn,
            forced_summary,
            timestamp: Utc::now(),
        });
    }
}

/// Tool calls without an id or a name cannot be answered.
fn check_response(response: ProviderResponse) -> Result<ProviderResponse, ProviderError> {
    if let Some(call) = response
        .message
        .tool_calls
        .iter()
        .find(|c| c.id.trim().is_empty() || c.name.trim().is_empty())
    {
        return Err(ProviderError::MalformedResponse(format!(
            "tool call without id or name (id: {:?}, name: {:?})",
            call.id, call.name
        )));
    }
    Ok(response)
}

fn summary_text(log: &[Message], status: RunStatus) -> String {
    if let RunStatus::Truncated { turns } = status {
        return format!(
            "Stopped after {turns} turns without finishing. Progress is saved; send \"continue\" to resume."
        );
    }
    let Some(last) = log.iter().rev().find(|m| m.role == Role::Assistant) else {
        return String::new();
    };
    prompts::extract_summary(&last.content).unwrap_or_else(|| last.content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prefers_marked_block() {
        let log = vec![
            Message::user("go"),
            Message::assistant(format!(
                "Done.\n{}\nAdded the page.\n{}",
                prompts::SUMMARY_START,
                prompts::SUMMARY_END
            )),
        ];
        assert_eq!(summary_text(&log, RunStatus::Completed), "Added the page.");
    }

    #[test]
    fn summary_falls_back_to_content() {
        let log = vec![Message::assistant("  I updated the header.  ")];
        assert_eq!(summary_text(&log, RunStatus::ImplicitStop), "I updated the header.");
    }

    #[test]
    fn truncated_summary_names_turns() {
        let text = summary_text(&[], RunStatus::Truncated { turns: 40 });
        assert!(text.contains("40 turns"));
    }

    #[test]
    fn malformed_calls_are_rejected() {
        let response = ProviderResponse {
            message: Message::assistant_with_calls(
                "",
                vec![MessageToolCall {
                    id: String::new(),
                    name: "write_files".into(),
                    arguments: "{}".into(),
                }],
            ),
            usage: None,
            model: "m".into(),
        };
        assert!(matches!(
            check_response(response),
            Err(ProviderError::MalformedResponse(_))
        ));
    }
}
