//! Canonical prompts and the summary-marker protocol.
//!
//! The system prompt starts with a fixed signature line. That line is how the
//! history compactor recognizes the authoritative system message among the
//! duplicates a long thread accumulates.

use sandpiper_core::message::{Message, Role};

/// First line of the canonical system prompt.
pub const SYSTEM_PROMPT_SIGNATURE: &str = "# sandpiper: autonomous coding agent";

/// Opens the final summary the model emits when it is done.
pub const SUMMARY_START: &str = "<<<TASK SUMMARY>>>";

/// Closes the final summary.
pub const SUMMARY_END: &str = "<<<END TASK SUMMARY>>>";

const SYSTEM_PROMPT_BODY: &str = "\
You are working inside a development sandbox on the user's project. You can act
only through tools:

- run_command: run a shell command from the project root. Package installs are
  checked against the manifest; trust the result line, not the installer output.
- write_files: create or overwrite files. Send complete file contents. Files
  whose content is already identical are skipped and reported as
  \"No changes needed\".
- read_files: read files before editing them when you are unsure of their content.

Work in small verified steps. When a tool result says \"Successfully wrote\" or
\"No changes needed\" for the files the request asked for, the work is done: do
not write the same files again.

When the request is complete, reply without any tool calls and end your reply
with exactly one summary block:

<<<TASK SUMMARY>>>
What you changed and why, in a few sentences.
<<<END TASK SUMMARY>>>";

/// Sent as a tool-less user turn when the loop decides the work is finished.
pub const COMPLETION_FORCING_PROMPT: &str = "\
The requested changes have been written successfully. Do not call any tools.
Reply now with your final summary block, starting with <<<TASK SUMMARY>>> and
ending with <<<END TASK SUMMARY>>>.";

/// The full canonical system prompt.
pub fn system_prompt() -> String {
    format!("{SYSTEM_PROMPT_SIGNATURE}\n\n{SYSTEM_PROMPT_BODY}")
}

/// Whether `msg` is a system message carrying the canonical signature.
pub fn is_canonical_system(msg: &Message) -> bool {
    msg.role == Role::System && msg.content.trim_start().starts_with(SYSTEM_PROMPT_SIGNATURE)
}

/// A response that opened the summary block is terminal, closed or not.
pub fn is_terminal_response(msg: &Message) -> bool {
    msg.role == Role::Assistant && msg.content.contains(SUMMARY_START)
}

/// The text between the summary markers, if present.
pub fn extract_summary(content: &str) -> Option<String> {
    let start = content.find(SUMMARY_START)? + SUMMARY_START.len();
    let rest = &content[start..];
    let body = match rest.find(SUMMARY_END) {
        Some(end) => &rest[..end],
        None => rest,
    };
    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}
