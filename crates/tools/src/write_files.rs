//! `write_files`: create or overwrite files in the sandbox.
//!
//! Files whose requested content matches what this session last wrote are
//! skipped. Writes are issued one at a time in request order and stop at the
//! first failure, so a failed batch has three disjoint parts: written, the
//! one file whose state is unknown, and files never attempted.

use sandpiper_core::sandbox::Sandbox;
use sandpiper_core::session::{SessionState, StateDelta};
use sandpiper_core::tool::{
    NO_CHANGES_PHRASE, PARTIAL_WRITE_PHRASE, ToolOutcome, WRITE_SUCCESS_PHRASE,
};
use tracing::{debug, warn};

use crate::invocation::FileSpec;
use crate::report::ToolReport;

pub async fn write_files(
    sandbox: &dyn Sandbox,
    files: &[FileSpec],
    state: &SessionState,
    whitespace_insensitive: bool,
) -> ToolReport {
    let requested: Vec<String> = files.iter().map(|f| f.path.clone()).collect();

    let (unchanged, changed): (Vec<&FileSpec>, Vec<&FileSpec>) = files
        .iter()
        .partition(|f| already_written(state, f, whitespace_insensitive));

    if changed.is_empty() {
        debug!(files = requested.len(), "All requested files already up to date");
        return ToolReport::new(
            format!(
                "{NO_CHANGES_PHRASE}: {} already contain the requested content. \
                 The files are written; do not write them again.",
                join_paths(unchanged.iter().map(|f| f.path.as_str()))
            ),
            ToolOutcome::NoChanges,
        )
        .with_paths(requested)
        .with_delta(StateDelta {
            task_completed: true,
            ..Default::default()
        });
    }

    let mut written: Vec<(String, String)> = Vec::with_capacity(changed.len());
    for (idx, file) in changed.iter().enumerate() {
        if let Err(e) = sandbox.write_file(&file.path, &file.content).await {
            let not_attempted: Vec<&str> =
                changed[idx + 1..].iter().map(|f| f.path.as_str()).collect();
            warn!(
                path = %file.path,
                error = %e,
                written = written.len(),
                not_attempted = not_attempted.len(),
                "Write batch failed"
            );
            return failure_report(&written, file, &e.to_string(), &not_attempted, requested);
        }
        written.push((file.path.clone(), file.content.clone()));
    }

    debug!(written = written.len(), skipped = unchanged.len(), "Files written");
    let mut content = format!(
        "{WRITE_SUCCESS_PHRASE} {} file(s): {}",
        written.len(),
        join_paths(written.iter().map(|(p, _)| p.as_str()))
    );
    if !unchanged.is_empty() {
        content.push_str(&format!(
            " (unchanged, skipped: {})",
            join_paths(unchanged.iter().map(|f| f.path.as_str()))
        ));
    }

    ToolReport::new(content, ToolOutcome::WriteSuccess)
        .with_paths(requested)
        .with_delta(StateDelta {
            written,
            task_completed: true,
            pending_write_errors: Some(false),
            ..Default::default()
        })
}

fn failure_report(
    written: &[(String, String)],
    failed: &FileSpec,
    reason: &str,
    not_attempted: &[&str],
    requested: Vec<String>,
) -> ToolReport {
    let mut lines = Vec::new();
    let outcome = if written.is_empty() {
        lines.push(format!("Failed to write {}: {reason}", failed.path));
        ToolOutcome::WriteFailed
    } else {
        lines.push(format!(
            "{PARTIAL_WRITE_PHRASE}: wrote {}",
            join_paths(written.iter().map(|(p, _)| p.as_str()))
        ));
        lines.push(format!("Failed on {}: {reason}", failed.path));
        ToolOutcome::PartialWrite
    };
    lines.push(format!(
        "State of {} is unknown; write it again.",
        failed.path
    ));
    if !not_attempted.is_empty() {
        lines.push(format!("Not attempted: {}", join_paths(not_attempted.iter().copied())));
    }

    ToolReport::new(lines.join("\n"), outcome)
        .with_paths(requested)
        .with_delta(StateDelta {
            written: written.to_vec(),
            pending_write_errors: Some(true),
            ..Default::default()
        })
}

fn already_written(state: &SessionState, file: &FileSpec, whitespace_insensitive: bool) -> bool {
    match state.written_files.get(&file.path) {
        Some(previous) if *previous == file.content => true,
        Some(previous) if whitespace_insensitive => {
            collapse_whitespace(previous) == collapse_whitespace(&file.content)
        }
        _ => false,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn join_paths<'a>(paths: impl Iterator<Item = &'a str>) -> String {
    paths.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeSandbox;

    fn spec(path: &str, content: &str) -> FileSpec {
        FileSpec {
            path: path.into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn writes_and_records_files() {
        let sandbox = FakeSandbox::new();
        let state = SessionState::new();
        let report = write_files(
            &sandbox,
            &[spec("index.html", "<h1>Hello world</h1>"), spec("app.css", "h1{}")],
            &state,
            false,
        )
        .await;

        assert_eq!(report.outcome, ToolOutcome::WriteSuccess);
        assert!(report.content.starts_with("Successfully wrote 2 file(s)"));
        assert_eq!(report.delta.written.len(), 2);
        assert!(report.delta.task_completed);
        assert_eq!(report.delta.pending_write_errors, Some(false));
        assert_eq!(sandbox.write_count(), 2);
    }

    #[tokio::test]
    async fn identical_rewrite_is_skipped() {
        let sandbox = FakeSandbox::new();
        let mut state = SessionState::new();
        state
            .written_files
            .insert("index.html".into(), "<h1>Hello world</h1>".into());

        let report = write_files(&sandbox, &[spec("index.html", "<h1>Hello world</h1>")], &state, false)
            .await;

        assert_eq!(report.outcome, ToolOutcome::NoChanges);
        assert!(report.content.starts_with(NO_CHANGES_PHRASE));
        assert!(report.delta.written.is_empty());
        assert!(report.delta.task_completed);
        assert_eq!(sandbox.write_count(), 0);
    }

    #[tokio::test]
    async fn only_changed_files_are_written() {
        let sandbox = FakeSandbox::new();
        let mut state = SessionState::new();
        state.written_files.insert("a".into(), "same".into());

        let report =
            write_files(&sandbox, &[spec("a", "same"), spec("b", "new")], &state, false).await;

        assert_eq!(report.outcome, ToolOutcome::WriteSuccess);
        assert_eq!(report.delta.written, vec![("b".to_string(), "new".to_string())]);
        assert!(report.content.contains("unchanged, skipped: a"));
        assert_eq!(sandbox.write_count(), 1);
    }

    #[tokio::test]
    async fn whitespace_knob_controls_comparison() {
        let sandbox = FakeSandbox::new();
        let mut state = SessionState::new();
        state.written_files.insert("a".into(), "x  =  1\n".into());

        let strict = write_files(&sandbox, &[spec("a", "x = 1")], &state, false).await;
        assert_eq!(strict.outcome, ToolOutcome::WriteSuccess);

        let lenient = write_files(&sandbox, &[spec("a", "x = 1")], &state, true).await;
        assert_eq!(lenient.outcome, ToolOutcome::NoChanges);
    }

    #[tokio::test]
    async fn partial_failure_reports_each_part() {
        let sandbox = FakeSandbox::new().failing_write("b");
        let state = SessionState::new();
        let report = write_files(
            &sandbox,
            &[spec("a", "1"), spec("b", "2"), spec("c", "3")],
            &state,
            false,
        )
        .await;

        assert_eq!(report.outcome, ToolOutcome::PartialWrite);
        assert!(report.content.starts_with(PARTIAL_WRITE_PHRASE));
        assert!(report.content.contains("Failed on b"));
        assert!(report.content.contains("State of b is unknown"));
        assert!(report.content.contains("Not attempted: c"));
        assert_eq!(report.delta.written, vec![("a".to_string(), "1".to_string())]);
        assert_eq!(report.delta.pending_write_errors, Some(true));
        assert!(!report.delta.task_completed);
    }

    #[tokio::test]
    async fn first_file_failure_is_write_failed() {
        let sandbox = FakeSandbox::new().failing_write("a");
        let report = write_files(&sandbox, &[spec("a", "1")], &SessionState::new(), false).await;
        assert_eq!(report.outcome, ToolOutcome::WriteFailed);
        assert!(report.delta.written.is_empty());
        assert_eq!(report.delta.pending_write_errors, Some(true));
    }
}
