//! `sandpiper show`: print a thread's checkpoint.

use std::fmt::Write;
use std::path::Path;

use sandpiper_core::checkpoint::Checkpoint;
use sandpiper_core::message::{Role, ThreadId};

use super::{load_config, open_store};

const PREVIEW_CHARS: usize = 160;

pub async fn run(
    config_path: Option<&Path>,
    thread: &str,
    last: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let store = open_store(&config);

    let Some(checkpoint) = store.get(&ThreadId::from(thread)).await? else {
        println!("No checkpoint for thread {thread} in the {} store.", store.name());
        return Ok(());
    };

    print!("{}", render(&checkpoint, last));
    Ok(())
}

fn render(checkpoint: &Checkpoint, last: usize) -> String {
    let session = &checkpoint.session;
    let status = if session.truncated {
        "truncated"
    } else if session.main_task_completed {
        "completed"
    } else {
        "in progress"
    };

    let mut out = String::new();
    let _ = writeln!(out, "Thread:    {}", checkpoint.thread_id);
    let _ = writeln!(out, "Status:    {status}");
    let _ = writeln!(out, "Updated:   {}", checkpoint.updated_at.to_rfc3339());
    let _ = writeln!(out, "Messages:  {}", checkpoint.messages.len());
    let _ = writeln!(out, "Last run:  {} turns", session.turns_taken);
    if session.has_pending_write_errors {
        let _ = writeln!(out, "Warning:   a write failed and its file state is unknown");
    }

    let _ = writeln!(out, "\nWritten files:");
    if session.written_files.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for path in session.written_files.keys() {
        let revisions = session.revisions.get(path).copied().unwrap_or(0);
        let _ = writeln!(out, "  {path} (rev {revisions})");
    }

    let start = checkpoint.messages.len().saturating_sub(last);
    let _ = writeln!(out, "\nLast {} messages:", checkpoint.messages.len() - start);
    for msg in &checkpoint.messages[start..] {
        let label = match msg.role {
            Role::System => "system".to_string(),
            Role::User => "user".to_string(),
            Role::Assistant if msg.has_tool_calls() => {
                let names: Vec<&str> = msg.tool_calls.iter().map(|c| c.name.as_str()).collect();
                format!("assistant -> {}", names.join(", "))
            }
            Role::Assistant => "assistant".to_string(),
            Role::Tool => match msg.outcome() {
                Some(outcome) => format!("tool [{outcome}]"),
                None => "tool".to_string(),
            },
        };
        let _ = writeln!(out, "  {label}: {}", preview(&msg.content));
    }
    out
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpiper_core::message::Message;
    use sandpiper_core::tool::ToolOutcome;

    fn sample() -> Checkpoint {
        let mut checkpoint = Checkpoint::new(ThreadId::from("t1"));
        checkpoint.messages = vec![
            Message::system("# sandpiper"),
            Message::user("write hello world on home page"),
            Message::tool_result("c1", "write_files", "Successfully wrote 1 file(s): index.html")
                .with_outcome(ToolOutcome::WriteSuccess),
        ];
        checkpoint
            .session
            .written_files
            .insert("index.html".into(), "<h1>Hello world</h1>".into());
        checkpoint.session.revisions.insert("index.html".into(), 1);
        checkpoint.session.main_task_completed = true;
        checkpoint
    }

    #[test]
    fn render_lists_files_and_status() {
        let text = render(&sample(), 10);
        assert!(text.contains("Status:    completed"));
        assert!(text.contains("index.html (rev 1)"));
        assert!(text.contains("tool [write_success]"));
    }

    #[test]
    fn render_limits_messages() {
        let text = render(&sample(), 1);
        assert!(text.contains("Last 1 messages:"));
        assert!(!text.contains("user: write hello world"));
    }

    #[test]
    fn long_content_is_shortened() {
        let long = "word ".repeat(100);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }
}
