//! Argument repair for model tool calls.
//!
//! Models routinely send arguments that are almost right: a single `path`
//! instead of a `files` array, `paths` where `files` was declared, a files
//! array that was JSON-encoded into a string, or the whole object wrapped in
//! a code fence. Each of these is rewritten into the canonical shape before
//! validation. Unknown keys are ignored.

use serde_json::{Map, Value};

use sandpiper_core::error::ToolError;

use crate::invocation::{FileSpec, ToolInvocation, ToolKind};

/// Keys accepted for a list of paths, in priority order.
const PATH_LIST_KEYS: &[&str] = &["files", "paths", "file_paths", "filenames"];
/// Keys accepted for a single path.
const PATH_KEYS: &[&str] = &["path", "file_path", "file", "filename"];
/// Keys accepted for a file body.
const CONTENT_KEYS: &[&str] = &["content", "contents", "text", "body"];
const COMMAND_KEYS: &[&str] = &["command", "cmd", "script"];

/// Repair `raw` into a valid invocation of `kind`.
pub fn repair(kind: ToolKind, raw: &str) -> Result<(ToolInvocation, Vec<String>), ToolError> {
    let mut notes = Vec::new();
    let args = parse_object(raw, &mut notes)?;

    let invocation = match kind {
        ToolKind::RunCommand => ToolInvocation::RunCommand {
            command: repair_command(&args, &mut notes)?,
        },
        ToolKind::WriteFiles => ToolInvocation::WriteFiles {
            files: repair_write_files(&args, &mut notes)?,
        },
        ToolKind::ReadFiles => ToolInvocation::ReadFiles {
            paths: repair_read_files(&args, &mut notes)?,
        },
    };
    Ok((invocation, notes))
}

/// Parse the raw argument string into a JSON object.
fn parse_object(raw: &str, notes: &mut Vec<String>) -> Result<Map<String, Value>, ToolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        notes.push("empty arguments treated as {}".into());
        return Ok(Map::new());
    }

    let mut value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(first) => {
            let unfenced = strip_code_fence(trimmed);
            match serde_json::from_str(unfenced) {
                Ok(v) => {
                    notes.push("stripped code fence around arguments".into());
                    v
                }
                Err(_) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "arguments are not valid JSON ({first})"
                    )));
                }
            }
        }
    };

    // Arguments double-encoded as a JSON string.
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner).map_err(|e| {
            ToolError::InvalidArguments(format!("arguments are a string, not an object ({e})"))
        })?;
        notes.push("decoded string-encoded arguments".into());
    }

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => {
            notes.push("null arguments treated as {}".into());
            Ok(Map::new())
        }
        other => Err(ToolError::InvalidArguments(format!(
            "arguments must be an object, got {}",
            type_name(&other)
        ))),
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().trim_end_matches("```").trim()
}

fn repair_command(args: &Map<String, Value>, notes: &mut Vec<String>) -> Result<String, ToolError> {
    let (key, value) = first_present(args, COMMAND_KEYS)
        .ok_or_else(|| ToolError::InvalidArguments("missing 'command'".into()))?;
    if key != "command" {
        notes.push(format!("used '{key}' as 'command'"));
    }

    let command = match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => {
            let words: Option<Vec<&str>> = parts.iter().map(Value::as_str).collect();
            let words = words.ok_or_else(|| {
                ToolError::InvalidArguments("'command' array must contain only strings".into())
            })?;
            notes.push("joined command array".into());
            words.join(" ")
        }
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "'command' must be a string, got {}",
                type_name(other)
            )));
        }
    };

    if command.trim().is_empty() {
        return Err(ToolError::InvalidArguments("'command' is empty".into()));
    }
    Ok(command)
}

fn repair_read_files(
    args: &Map<String, Value>,
    notes: &mut Vec<String>,
) -> Result<Vec<String>, ToolError> {
    let paths = if let Some((key, value)) = first_present(args, PATH_LIST_KEYS) {
        if key != "files" {
            notes.push(format!("used '{key}' as 'files'"));
        }
        path_list(value, notes)?
    } else if let Some((key, value)) = first_present(args, PATH_KEYS) {
        notes.push(format!("wrapped single '{key}' into 'files'"));
        path_list(value, notes)?
    } else {
        return Err(ToolError::InvalidArguments("missing 'files'".into()));
    };

    if paths.is_empty() {
        return Err(ToolError::InvalidArguments("'files' is empty".into()));
    }
    Ok(paths)
}

/// Coerce a value into a list of non-empty paths.
fn path_list(value: &Value, notes: &mut Vec<String>) -> Result<Vec<String>, ToolError> {
    match value {
        Value::String(s) => {
            if let Ok(decoded @ Value::Array(_)) = serde_json::from_str::<Value>(s) {
                notes.push("decoded string-encoded path list".into());
                return path_list(&decoded, notes);
            }
            non_empty_path(s).map(|p| vec![p])
        }
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => non_empty_path(s),
                Value::Object(obj) => match first_present(obj, PATH_KEYS) {
                    Some((_, Value::String(s))) => non_empty_path(s),
                    _ => Err(ToolError::InvalidArguments(
                        "file entry object has no 'path'".into(),
                    )),
                },
                other => Err(ToolError::InvalidArguments(format!(
                    "file entries must be strings, got {}",
                    type_name(other)
                ))),
            })
            .collect(),
        other => Err(ToolError::InvalidArguments(format!(
            "'files' must be an array of paths, got {}",
            type_name(other)
        ))),
    }
}

fn repair_write_files(
    args: &Map<String, Value>,
    notes: &mut Vec<String>,
) -> Result<Vec<FileSpec>, ToolError> {
    let files = if let Some(value) = args.get("files") {
        file_specs(value, notes)?
    } else if first_present(args, PATH_KEYS).is_some() {
        notes.push("wrapped top-level path/content into 'files'".into());
        vec![file_spec(args)?]
    } else {
        return Err(ToolError::InvalidArguments("missing 'files'".into()));
    };

    if files.is_empty() {
        return Err(ToolError::InvalidArguments("'files' is empty".into()));
    }
    Ok(dedupe_by_path(files, notes))
}

fn file_specs(value: &Value, notes: &mut Vec<String>) -> Result<Vec<FileSpec>, ToolError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => file_spec(obj),
                other => Err(ToolError::InvalidArguments(format!(
                    "file entries must be objects with 'path' and 'content', got {}",
                    type_name(other)
                ))),
            })
            .collect(),
        Value::String(s) => {
            let decoded: Value = serde_json::from_str(s).map_err(|e| {
                ToolError::InvalidArguments(format!("'files' is a string that is not JSON ({e})"))
            })?;
            notes.push("decoded string-encoded files array".into());
            file_specs(&decoded, notes)
        }
        Value::Object(obj) if first_present(obj, PATH_KEYS).is_some() => {
            notes.push("wrapped single file object into array".into());
            Ok(vec![file_spec(obj)?])
        }
        // {"files": {"a.txt": "body", "b.txt": "body"}}
        Value::Object(obj) => {
            notes.push("converted path-to-content map into array".into());
            obj.iter()
                .map(|(path, content)| {
                    let content = content.as_str().ok_or_else(|| {
                        ToolError::InvalidArguments(format!("content for '{path}' is not a string"))
                    })?;
                    Ok(FileSpec {
                        path: non_empty_path(path)?,
                        content: content.to_string(),
                    })
                })
                .collect()
        }
        other => Err(ToolError::InvalidArguments(format!(
            "'files' must be an array, got {}",
            type_name(other)
        ))),
    }
}

fn file_spec(obj: &Map<String, Value>) -> Result<FileSpec, ToolError> {
    let path = match first_present(obj, PATH_KEYS) {
        Some((_, Value::String(s))) => non_empty_path(s)?,
        Some((key, other)) => {
            return Err(ToolError::InvalidArguments(format!(
                "'{key}' must be a string, got {}",
                type_name(other)
            )));
        }
        None => return Err(ToolError::InvalidArguments("file entry has no 'path'".into())),
    };
    let content = match first_present(obj, CONTENT_KEYS) {
        Some((_, Value::String(s))) => s.clone(),
        Some((_, Value::Array(lines))) if lines.iter().all(Value::is_string) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        Some((key, other)) => {
            return Err(ToolError::InvalidArguments(format!(
                "'{key}' for '{path}' must be a string, got {}",
                type_name(other)
            )));
        }
        None => {
            return Err(ToolError::InvalidArguments(format!(
                "file entry '{path}' has no 'content'"
            )));
        }
    };
    Ok(FileSpec { path, content })
}

/// Keep the last content for each path, ordered by first appearance.
fn dedupe_by_path(files: Vec<FileSpec>, notes: &mut Vec<String>) -> Vec<FileSpec> {
    let mut out: Vec<FileSpec> = Vec::with_capacity(files.len());
    for file in files {
        if let Some(existing) = out.iter_mut().find(|f| f.path == file.path) {
            notes.push(format!("'{}' listed twice, kept the last content", file.path));
            existing.content = file.content;
        } else {
            out.push(file);
        }
    }
    out
}

fn non_empty_path(s: &str) -> Result<String, ToolError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Err(ToolError::InvalidArguments("empty file path".into()))
    } else {
        Ok(trimmed.to_string())
    }
}

fn first_present<'a>(
    obj: &'a Map<String, Value>,
    keys: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
