//! External attribute adapters.
//!
//! An adapter fetches attributes for one identifier from an external
//! service. Transport and authentication live in the adapter implementation;
//! so does the call timeout.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use warrant_types::AttributeSet;

use crate::error::AdapterError;

/// Connection settings for one adapter.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConnection {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl AdapterConnection {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token_endpoint: None,
            client_id: None,
            client_secret: None,
        }
    }
}

impl fmt::Debug for AdapterConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterConnection")
            .field("endpoint", &self.endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of attributes outside the privilege store.
pub trait AttributeAdapter: Send + Sync + fmt::Debug {
    fn endpoint(&self) -> &str;

    fn fetch_attributes(&self, identifier: &str) -> Result<AttributeSet, AdapterError>;
}

/// Builds adapters from connection settings.
pub trait AdapterProvider: Send + Sync {
    fn adapter(&self, connection: &AdapterConnection) -> Result<Arc<dyn AttributeAdapter>, AdapterError>;
}

// ============================================================================
// Static Adapter
// ============================================================================

/// Adapter answering from a fixed map.
///
/// Unknown identifiers resolve to an empty set. A failing adapter returns
/// its configured error for every identifier.
#[derive(Debug, Clone)]
pub struct StaticAttributeAdapter {
    endpoint: String,
    attributes: HashMap<String, AttributeSet>,
    failure: Option<AdapterError>,
}

impl StaticAttributeAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            attributes: HashMap::new(),
            failure: None,
        }
    }

    pub fn failing(endpoint: impl Into<String>, error: AdapterError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(endpoint)
        }
    }

    pub fn with_attributes(mut self, identifier: impl Into<String>, attributes: AttributeSet) -> Self {
        self.attributes.insert(identifier.into(), attributes);
        self
    }
}

impl AttributeAdapter for StaticAttributeAdapter {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn fetch_attributes(&self, identifier: &str) -> Result<AttributeSet, AdapterError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.attributes.get(identifier).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Registry Provider
// ============================================================================

/// Provider that hands out pre-registered adapters by endpoint.
#[derive(Debug, Default)]
pub struct StaticAdapterProvider {
    adapters: RwLock<HashMap<String, Arc<dyn AttributeAdapter>>>,
}

impl StaticAdapterProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under its endpoint, replacing any previous one.
    pub fn register(&self, adapter: Arc<dyn AttributeAdapter>) {
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(adapter.endpoint().to_string(), adapter);
    }
}

impl AdapterProvider for StaticAdapterProvider {
    fn adapter(&self, connection: &AdapterConnection) -> Result<Arc<dyn AttributeAdapter>, AdapterError> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&connection.endpoint)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownEndpoint(connection.endpoint.clone()))
    }
}
