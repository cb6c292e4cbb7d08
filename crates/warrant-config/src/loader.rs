//! Configuration loader with multi-source merging

use crate::{Paths, WarrantConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "WARRANT".to_string(),
            user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "WARRANT")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/warrant/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<WarrantConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = WarrantConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/warrant/config.toml)
        if self.user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                if user_config_file.exists() {
                    debug!(path = %user_config_file.display(), "loading user config");
                    builder = builder.add_source(
                        config::File::from(user_config_file)
                            .required(false)
                            .format(config::FileFormat::Toml),
                    );
                }
            }
        }

        // 3. Project config (warrant.toml), then 4. local config (warrant.local.toml)
        for file in [
            Paths::project_config_file(&self.project_dir),
            Paths::local_config_file(&self.project_dir),
        ] {
            if file.exists() {
                debug!(path = %file.display(), "loading project config");
                builder = builder.add_source(
                    config::File::from(file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 5. Environment variables (WARRANT_DECISION_CACHE__TTL_SECONDS=60)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let warrant_config: WarrantConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        warrant_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(warrant_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> WarrantConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("WARRANT_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config, WarrantConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[decision_cache]
ttl_seconds = 30

[adapters]
max_attributes = 100

[logging]
filter = "warrant=debug"

[[zones]]
name = "zone-1"

[zones.subject_connector]
max_cached_interval_minutes = 60

[[zones.subject_connector.adapters]]
endpoint = "https://attributes.example.com/v1/subjects"
client_id = "acs"
"#;
        fs::write(project_dir.join("warrant.toml"), config_content).expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.decision_cache.ttl_seconds, 30);
        assert!(config.decision_cache.enabled);
        assert_eq!(config.adapters.max_attributes, 100);
        assert_eq!(config.adapters.max_size_bytes, 500_000);
        assert_eq!(config.logging.filter, "warrant=debug");

        let zone = &config.zones[0];
        assert_eq!(zone.name, "zone-1");
        let connector = zone.subject_connector.as_ref().unwrap();
        assert!(connector.is_active);
        assert_eq!(connector.max_cached_interval_minutes, 60);
        assert_eq!(connector.adapters[0].client_id.as_deref(), Some("acs"));
        assert!(zone.resource_connector.is_none());
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("warrant.toml"),
            r#"
[attribute_cache]
ttl_minutes = 60
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("warrant.local.toml"),
            r#"
[attribute_cache]
ttl_minutes = 5
"#,
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        // Local config should override project config
        assert_eq!(config.attribute_cache.ttl_minutes, 5);
    }

    #[test]
    fn test_invalid_values_fail_loading() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("warrant.toml"),
            "[attribute_cache]\nttl_minutes = 0\n",
        )
        .expect("Failed to write config");

        assert!(loader(temp_dir.path()).load().is_err());
        assert_eq!(
            loader(temp_dir.path()).load_or_default(),
            WarrantConfig::default()
        );
    }

    // Environment overrides are not exercised here because the process
    // environment is shared between tests. In actual usage:
    //
    // WARRANT_DECISION_CACHE__TTL_SECONDS=60
    // WARRANT_ATTRIBUTE_CACHE__ENABLED=false
    // WARRANT_LOGGING__FILTER=debug
}
