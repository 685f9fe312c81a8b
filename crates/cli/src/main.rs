//! Sandpiper CLI, the main entry point.
//!
//! Commands:
//! - `run`   : hand one request to the agent loop for a thread
//! - `show`  : print a thread's checkpoint
//! - `init`  : write the default config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sandpiper",
    about = "Sandpiper: an autonomous coding agent for a development sandbox",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Use this config file instead of ~/.sandpiper/config.toml
    #[arg(short, long, global = true, env = "SANDPIPER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one request against a thread
    Run {
        /// Thread to continue; a new one is created when omitted
        #[arg(short, long)]
        thread: Option<String>,

        /// Transport session id, recorded in logs
        #[arg(short, long)]
        session: Option<String>,

        /// The request, e.g. "write hello world on home page"
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Show a thread's stored state
    Show {
        #[arg(short, long)]
        thread: String,

        /// Number of trailing messages to print
        #[arg(short, long, default_value_t = 10)]
        last: usize,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            thread,
            session,
            query,
        } => commands::run::run(config_path, thread, session, query.join(" ")).await?,
        Commands::Show { thread, last } => commands::show::run(config_path, &thread, last).await?,
        Commands::Init { force } => commands::init::run(config_path, force)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_joins_query_words() {
        let cli = Cli::try_parse_from([
            "sandpiper", "run", "--thread", "t1", "write", "hello", "world",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { thread, query, .. } => {
                assert_eq!(thread.as_deref(), Some("t1"));
                assert_eq!(query.join(" "), "write hello world");
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_query() {
        assert!(Cli::try_parse_from(["sandpiper", "run"]).is_err());
    }

    #[test]
    fn show_requires_thread() {
        assert!(Cli::try_parse_from(["sandpiper", "show"]).is_err());
        let cli = Cli::try_parse_from(["sandpiper", "show", "-t", "abc", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
    }
}
