//! Configuration management for Warrant
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (WARRANT_* prefix, `__` between section and key)
//! 2. warrant.local.toml (gitignored, local overrides)
//! 3. warrant.toml (git-tracked, project config)
//! 4. ~/.config/warrant/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use warrant_attributes::{AttributeConnector, AttributeLimits, ReaderSettings, ZoneConnectors};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Warrant configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarrantConfig {
    pub attribute_cache: AttributeCacheConfig,
    pub condition_cache: ConditionCacheConfig,
    pub decision_cache: DecisionCacheConfig,
    pub adapters: AdapterConfig,
    pub logging: LoggingConfig,
    pub zones: Vec<ZoneConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeCacheConfig {
    pub enabled: bool,
    /// Upper bound on every connector's cache interval.
    pub ttl_minutes: u64,
}

impl Default for AttributeCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_minutes: 480,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionCacheConfig {
    pub enabled: bool,
}

impl Default for ConditionCacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionCacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for DecisionCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 600,
        }
    }
}

impl DecisionCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub max_attributes: usize,
    pub max_size_bytes: usize,
    /// Call timeout handed to adapter implementations.
    pub timeout_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_attributes: 1500,
            max_size_bytes: 500_000,
            timeout_ms: 3000,
        }
    }
}

impl AdapterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn limits(&self) -> AttributeLimits {
        AttributeLimits {
            max_attributes: self.max_attributes,
            max_size_bytes: self.max_size_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Zone definition from config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_connector: Option<AttributeConnector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_connector: Option<AttributeConnector>,
}

impl ZoneConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_connector: None,
            subject_connector: None,
        }
    }

    /// Connectors with their cache intervals capped at `max_ttl_minutes`.
    pub fn connectors(&self, max_ttl_minutes: u64) -> ZoneConnectors {
        let capped = |connector: &AttributeConnector| AttributeConnector {
            max_cached_interval_minutes: connector.max_cached_interval_minutes.min(max_ttl_minutes),
            ..connector.clone()
        };
        ZoneConnectors {
            resource: self.resource_connector.as_ref().map(capped),
            subject: self.subject_connector.as_ref().map(capped),
        }
    }
}

impl WarrantConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse and validate a single TOML file, without other sources.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Settings for attribute readers built from this configuration.
    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            cache_enabled: self.attribute_cache.enabled,
            limits: self.adapters.limits(),
        }
    }

    /// Rejects zero TTLs for enabled caches, zero limits and bad zones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::ValidationError(message.to_string()));

        if self.attribute_cache.enabled && self.attribute_cache.ttl_minutes == 0 {
            return invalid("attribute_cache.ttl_minutes must be positive when the cache is enabled");
        }
        if self.decision_cache.enabled && self.decision_cache.ttl_seconds == 0 {
            return invalid("decision_cache.ttl_seconds must be positive when the cache is enabled");
        }
        if self.adapters.max_attributes == 0 {
            return invalid("adapters.max_attributes must be positive");
        }
        if self.adapters.max_size_bytes == 0 {
            return invalid("adapters.max_size_bytes must be positive");
        }
        if self.adapters.timeout_ms == 0 {
            return invalid("adapters.timeout_ms must be positive");
        }

        let mut names = HashSet::new();
        for zone in &self.zones {
            if zone.name.trim().is_empty() {
                return invalid("zone names must not be blank");
            }
            if !names.insert(zone.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "zone '{}' is defined more than once",
                    zone.name
                )));
            }
            for connector in [&zone.resource_connector, &zone.subject_connector]
                .into_iter()
                .flatten()
                .filter(|c| c.is_active)
            {
                if connector.adapters.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "zone '{}' has an active connector without adapters",
                        zone.name
                    )));
                }
                if connector.max_cached_interval_minutes == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "zone '{}' has a connector with a zero cache interval",
                        zone.name
                    )));
                }
            }
        }
        Ok(())
    }
}
