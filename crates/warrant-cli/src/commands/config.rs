//! Configuration display.

use anyhow::{Context, Result};
use warrant_config::WarrantConfig;

pub fn show_toml(config: &WarrantConfig) -> Result<()> {
    let text = config.to_toml().context("Failed to render configuration")?;
    print!("{text}");
    Ok(())
}

pub fn show_json(config: &WarrantConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
