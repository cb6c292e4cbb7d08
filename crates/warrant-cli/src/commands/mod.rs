//! CLI command implementations.

pub mod config;
pub mod eval;
pub mod validate;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};
use warrant_config::{ConfigLoader, WarrantConfig};

/// Loads defaults, user config, `warrant.toml`, `warrant.local.toml` and
/// `WARRANT_*` variables for `project`.
pub fn load_config(project: &Path) -> Result<WarrantConfig> {
    ConfigLoader::new()
        .with_project_dir(project)
        .load()
        .with_context(|| format!("Failed to load configuration from {}", project.display()))
}
