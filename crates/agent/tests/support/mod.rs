//! Shared helpers for agent integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sandpiper_agent::AgentLoop;
use sandpiper_checkpoint::InMemoryCheckpointStore;
use sandpiper_core::error::{ProviderError, SandboxError};
use sandpiper_core::message::{Message, MessageToolCall};
use sandpiper_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use sandpiper_core::sandbox::{CommandOutput, Sandbox};
use sandpiper_tools::ToolDispatcher;

/// A mock provider that plays back scripted results in order and records
/// every request it receives.
///
/// Panics if more calls are made than results provided.
pub struct ScriptedProvider {
    script: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn responses(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let mut script = self.script.lock().unwrap();
        if requests.len() >= script.len() {
            panic!(
                "ScriptedProvider: no more responses (call #{}, have {})",
                requests.len(),
                script.len()
            );
        }
        let index = requests.len();
        requests.push(request);
        std::mem::replace(
            &mut script[index],
            Err(ProviderError::Network("already consumed".into())),
        )
    }
}

/// Create a simple text response (no tool calls).
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn tool_call_response(calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls(thought, calls),
        usage: None,
        model: "mock-model".into(),
    }
}

pub fn summary_response(summary: &str) -> ProviderResponse {
    text_response(&format!(
        "All done.\n{}\n{summary}\n{}",
        sandpiper_agent::prompts::SUMMARY_START,
        sandpiper_agent::prompts::SUMMARY_END
    ))
}

pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// An in-memory sandbox: files live in a map, commands echo nothing.
#[derive(Default)]
pub struct MemorySandbox {
    pub files: Mutex<HashMap<String, String>>,
    pub commands: Mutex<HashMap<String, CommandOutput>>,
    pub writes: Mutex<Vec<String>>,
}

impl MemorySandbox {
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

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Sandbox for MemorySandbox {
    fn name(&self) -> &str {
        "memory"
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        Ok(self
            .commands
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_default())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
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

pub struct Harness {
    pub provider: Arc<ScriptedProvider>,
    pub sandbox: Arc<MemorySandbox>,
    pub store: Arc<InMemoryCheckpointStore>,
    pub agent: AgentLoop,
}

pub fn harness(script: Vec<Result<ProviderResponse, ProviderError>>, sandbox: MemorySandbox) -> Harness {
    let provider = Arc::new(ScriptedProvider::new(script));
    let sandbox = Arc::new(sandbox);
    let store = Arc::new(InMemoryCheckpointStore::new());
    let dispatcher = Arc::new(ToolDispatcher::new(sandbox.clone()));
    let agent = AgentLoop::new(provider.clone(), dispatcher, store.clone(), "mock-model");
    Harness {
        provider,
        sandbox,
        store,
        agent,
    }
}
