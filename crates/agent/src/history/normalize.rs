//! Content normalization and hashing for duplicate detection.
//!
//! Two messages are "the same" when they differ only in case, whitespace, or
//! volatile fragments such as timestamps and elapsed times.

use std::sync::LazyLock;

use regex_lite::Regex;
use sandpiper_core::message::{Message, MessageToolCall};
use sha2::{Digest, Sha256};

/// A short, stable digest of normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(u64);

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

static ISO_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[t ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(z|[+-]\d{2}:?\d{2})?")
        .expect("valid timestamp regex")
});

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[\s\[(])\d{1,2}:\d{2}(:\d{2})?(\.\d+)?\b").expect("valid clock regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(\.\d+)?\s?(ms|s|sec|secs|seconds|m|min|mins|minutes|h|hrs|hours)\b")
        .expect("valid duration regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Lower-case, elide volatile fragments, and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let text = ISO_TIMESTAMP.replace_all(&lower, "<ts>");
    let text = CLOCK_TIME.replace_all(&text, "${1}<time>");
    let text = DURATION.replace_all(&text, "<dur>");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Digest of already-normalized text.
pub fn digest(normalized: &str) -> ContentHash {
    let hash = Sha256::digest(normalized.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&hash[..8]);
    ContentHash(u64::from_be_bytes(buf))
}

/// Hash of a piece of text after normalization.
pub fn content_hash(text: &str) -> ContentHash {
    digest(&normalize(text))
}

/// Hash of text exactly as given, for comparing file contents.
pub fn raw_hash(text: &str) -> ContentHash {
    digest(text)
}

/// Order-insensitive signature of the tool calls an assistant requested.
///
/// Call ids are ignored; arguments are compared after JSON re-serialization
/// when they parse, so key order and spacing do not matter.
pub fn tool_call_signature(calls: &[MessageToolCall]) -> Option<ContentHash> {
    if calls.is_empty() {
        return None;
    }
    let mut parts: Vec<String> = calls
        .iter()
        .map(|c| {
            let args = serde_json::from_str::<serde_json::Value>(&c.arguments)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| normalize(&c.arguments));
            format!("{}({args})", c.name)
        })
        .collect();
    parts.sort();
    Some(digest(&parts.join("|")))
}

/// Hash used for user/assistant duplicate detection.
///
/// An assistant's requested tool calls are part of its identity; two empty
/// assistant turns calling different tools are not duplicates.
pub fn message_hash(msg: &Message) -> ContentHash {
    match tool_call_signature(&msg.tool_calls) {
        Some(sig) => digest(&format!("{}#{sig}", normalize(&msg.content))),
        None => content_hash(&msg.content),
    }
}
