//! `read_files`: read one or more sandbox files.
//!
//! The result is a sequence of path-delimited blocks. The same block is
//! staged as the read snapshot so a later turn can still see the content
//! when the tool message itself is deduplicated away.

use sandpiper_core::sandbox::Sandbox;
use sandpiper_core::session::StateDelta;
use sandpiper_core::tool::ToolOutcome;
use tracing::debug;

use crate::report::ToolReport;

pub async fn read_files(sandbox: &dyn Sandbox, paths: &[String]) -> ToolReport {
    let mut blocks = Vec::with_capacity(paths.len());
    let mut failures = 0usize;

    for path in paths {
        match sandbox.read_file(path).await {
            Ok(content) => blocks.push(format!("=== {path} ===\n{}", content.trim_end())),
            Err(e) => {
                failures += 1;
                blocks.push(format!("=== {path} ===\n[error: {e}]"));
            }
        }
    }

    debug!(files = paths.len(), failures, "Read files");
    let body = blocks.join("\n\n");

    if failures == paths.len() {
        return ToolReport::new(body, ToolOutcome::ReadFailed).with_paths(paths.to_vec());
    }

    ToolReport::new(body.clone(), ToolOutcome::ReadSuccess)
        .with_paths(paths.to_vec())
        .with_delta(StateDelta {
            read_snapshot: Some(body),
            ..Default::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeSandbox;

    #[tokio::test]
    async fn reads_into_delimited_blocks() {
        let sandbox = FakeSandbox::new()
            .with_file("src/App.tsx", "export default App;\n")
            .with_file("package.json", "{}");
        let paths = vec!["src/App.tsx".to_string(), "package.json".to_string()];
        let report = read_files(&sandbox, &paths).await;

        assert_eq!(report.outcome, ToolOutcome::ReadSuccess);
        assert_eq!(
            report.content,
            "=== src/App.tsx ===\nexport default App;\n\n=== package.json ===\n{}"
        );
        assert_eq!(report.delta.read_snapshot.as_deref(), Some(report.content.as_str()));
    }

    #[tokio::test]
    async fn missing_file_is_reported_inline() {
        let sandbox = FakeSandbox::new().with_file("a.txt", "A");
        let paths = vec!["a.txt".to_string(), "b.txt".to_string()];
        let report = read_files(&sandbox, &paths).await;
        assert_eq!(report.outcome, ToolOutcome::ReadSuccess);
        assert!(report.content.contains("=== b.txt ===\n[error:"));
    }

    #[tokio::test]
    async fn all_missing_is_read_failed() {
        let sandbox = FakeSandbox::new();
        let report = read_files(&sandbox, &["nope".to_string()]).await;
        assert_eq!(report.outcome, ToolOutcome::ReadFailed);
        assert!(report.delta.read_snapshot.is_none());
    }
}
