//! # warrant-types: Core types for `Warrant`
//!
//! This crate contains shared types used across the `Warrant` decision engine:
//! - Tenant partitioning ([`ZoneId`])
//! - Entity kinds ([`EntityKind`])
//! - Attributes ([`Attribute`], [`AttributeType`], [`AttributeSet`])
//! - Resource URI templates ([`UriTemplate`], [`canonicalize`])
//! - Time sources for cache expiry ([`Clock`])

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub mod attributes;
pub mod clock;
pub mod uri_template;

pub use attributes::{Attribute, AttributeSet, AttributeType};
pub use clock::{Clock, ManualClock, SystemClock, duration_ns};
pub use uri_template::{ATTRIBUTE_URI_VARIABLE, UriTemplate, UriTemplateError, canonicalize};

// ============================================================================
// Zone
// ============================================================================

/// Identifier of a zone, the tenant partition that isolates policies,
/// attributes and caches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ZoneId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for ZoneId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<ZoneId> for String {
    fn from(value: ZoneId) -> Self {
        value.0
    }
}

// ============================================================================
// Entity Kind
// ============================================================================

/// The two kinds of entity that carry attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// The principal requesting access.
    Subject,
    /// The thing being accessed, identified by a URI.
    Resource,
}

impl EntityKind {
    /// Stable lowercase name, used in cache key namespaces.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Resource => "resource",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
