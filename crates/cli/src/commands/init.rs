//! `sandpiper init`: write the default configuration.

use std::path::Path;

use sandpiper_config::AppConfig;

pub fn run(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or re-run with --force.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;

    let defaults = AppConfig::default();
    std::fs::create_dir_all(&defaults.tools.sandbox_root)?;
    std::fs::create_dir_all(&defaults.checkpoint.dir)?;

    println!("Created config at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set SANDPIPER_API_KEY (or add api_key under [provider])");
    println!("  2. Point tools.sandbox_root at your project");
    println!("  3. Run: sandpiper run \"write hello world on home page\"");

    Ok(())
}
