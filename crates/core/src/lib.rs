//! # Sandpiper Core
//!
//! Domain types, collaborator traits, and error definitions for the sandpiper
//! coding-agent engine. The model client, the development sandbox and the
//! checkpoint store are all defined here as traits; implementations live in
//! their own crates so the engine can be driven by mocks in tests.

pub mod checkpoint;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod sandbox;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role, ThreadId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use sandbox::{CommandOutput, Sandbox};
pub use session::{SessionState, StateDelta};
pub use tool::ToolOutcome;
