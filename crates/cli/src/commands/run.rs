//! `sandpiper run`: hand one request to the agent loop.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sandpiper_agent::{AgentLoop, RunStatus, TaskEvent};
use sandpiper_config::AppConfig;
use sandpiper_core::event::DomainEvent;
use sandpiper_core::message::ThreadId;
use sandpiper_providers::OpenAiCompatProvider;
use sandpiper_tools::LocalSandbox;

use super::{load_config, open_store};

pub async fn run(
    config_path: Option<&Path>,
    thread: Option<String>,
    session: Option<String>,
    query: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    SANDPIPER_API_KEY, OPENROUTER_API_KEY, OPENAI_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);

    std::fs::create_dir_all(&config.tools.sandbox_root)?;
    let sandbox = Arc::new(
        LocalSandbox::new(&config.tools.sandbox_root)
            .with_timeout(Duration::from_secs(config.tools.command_timeout_secs)),
    );
    let store = open_store(&config);

    let agent = AgentLoop::from_config(&config, provider, sandbox, store);

    let thread_id = thread.map(|t| ThreadId::from(&t)).unwrap_or_default();
    let mut event = TaskEvent::new(thread_id.clone(), query);
    if let Some(session) = session {
        event = event.with_session(session);
    }

    let mut rx = agent.event_bus().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event.as_ref() {
                DomainEvent::TurnStarted {
                    turn,
                    forced_summary,
                    ..
                } => {
                    if *forced_summary {
                        eprintln!("  [turn {turn}] asking for the final summary");
                    } else {
                        eprintln!("  [turn {turn}] thinking...");
                    }
                }
                DomainEvent::ToolExecuted {
                    tool_name,
                    outcome,
                    duration_ms,
                    ..
                } => eprintln!("    {tool_name} -> {outcome} ({duration_ms}ms)"),
                DomainEvent::InvocationFinished { .. } => break,
                _ => {}
            }
        }
    });

    let result = agent.handle(event).await;
    progress.abort();
    let outcome = result?;

    println!("{}", outcome.summary_text);
    eprintln!();
    eprintln!("  thread: {}", outcome.thread_id);
    match outcome.status {
        RunStatus::Truncated { turns } => {
            eprintln!("  status: truncated after {turns} turns");
        }
        status => eprintln!("  status: {status}"),
    }

    Ok(())
}
