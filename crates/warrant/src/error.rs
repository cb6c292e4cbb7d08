//! Error types for the `Warrant` facade.

use std::path::PathBuf;

use thiserror::Error;
use warrant_abac::{PolicyEvaluationError, PolicyValidationError};
use warrant_attributes::StoreError;
use warrant_config::ConfigError;

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, WarrantError>;

#[derive(Debug, Error)]
pub enum WarrantError {
    #[error(transparent)]
    Evaluation(#[from] PolicyEvaluationError),

    #[error("invalid policy set: {0}")]
    Validation(#[from] PolicyValidationError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to read fixture {path}: {source}")]
    FixtureRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse fixture: {0}")]
    FixtureParse(#[from] serde_json::Error),
}

impl WarrantError {
    /// Whether the error comes from the caller's request or policy input
    /// rather than from attribute sources, stores or conditions.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Evaluation(
                    PolicyEvaluationError::UnknownPolicySet { .. }
                        | PolicyEvaluationError::AmbiguousEvaluationOrder { .. }
                )
        )
    }
}
