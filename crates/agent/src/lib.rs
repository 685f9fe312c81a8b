//! The sandpiper agent loop.
//!
//! An invocation follows a small state machine:
//!
//! 1. **START**: load the thread's checkpoint and append the user request
//! 2. **ASK_MODEL**: build a bounded view of the history, consult the
//!    completion detector, and call the model
//! 3. **RUN_TOOLS**: dispatch the requested tool calls and fold their
//!    results into the session state, then go back to 2
//! 4. **END**: persist the checkpoint and return the summary
//!
//! The loop stops when the model emits its summary block, answers without
//! tool calls, is forced to summarize after a completed write, or hits the
//! recursion limit.

pub mod completion;
pub mod history;
pub mod loop_runner;
pub mod policy;
pub mod prompts;
pub mod serial;

pub use completion::{CompletionDetector, ForceReason, Verdict};
pub use history::{Compactor, HistoryRules, HistoryView, LoopClass, LoopReport};
pub use loop_runner::{AgentLoop, HandleOutcome, RunStatus, TaskEvent};
pub use policy::{KeywordTaskClassifier, OutcomeSignals, RequestKind, SignalPolicy, TaskClassifier};
pub use serial::ThreadLocks;
