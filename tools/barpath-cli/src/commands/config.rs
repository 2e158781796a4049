//! Show or write configuration.

use std::path::PathBuf;

use anyhow::Context;
use barpath_common::config::{config_file_path, AppConfig};
use barpath_tracking_engine::EngineConfig;

pub fn run(path: Option<PathBuf>, write: bool, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config_file_path);

    if !write {
        let app = if path.exists() {
            AppConfig::load_from(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?
        } else {
            AppConfig::default()
        };
        println!("# {}", path.display());
        println!("{}", serde_json::to_string_pretty(&app)?);
        println!();
        println!("# engine tuning defaults (use with \"tuning_file\")");
        println!("{}", serde_json::to_string_pretty(&EngineConfig::default())?);
        return Ok(());
    }

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        );
    }
    AppConfig::default()
        .save_to(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
