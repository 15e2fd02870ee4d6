//! Show or write configuration.

use inlay_common::config::{config_file_path, AppConfig};

pub fn run(config: AppConfig, write_default: bool) -> anyhow::Result<()> {
    if write_default {
        let path = AppConfig::default().save()?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    println!("# {}", config_file_path().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
