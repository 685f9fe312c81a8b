pub mod init;
pub mod run;
pub mod show;

use std::path::Path;
use std::sync::Arc;

use sandpiper_checkpoint::{FileCheckpointStore, InMemoryCheckpointStore};
use sandpiper_config::AppConfig;
use sandpiper_core::checkpoint::CheckpointStore;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

/// The checkpoint backend named in `[checkpoint]`.
pub fn open_store(config: &AppConfig) -> Arc<dyn CheckpointStore> {
    match config.checkpoint.backend.as_str() {
        "memory" => Arc::new(InMemoryCheckpointStore::new()),
        _ => Arc::new(FileCheckpointStore::new(&config.checkpoint.dir)),
    }
}
