//! # warrant-attributes: Attribute resolution for `Warrant`
//!
//! Resolves the attributes of subjects and resources for policy evaluation.
//!
//! - [`cache`]: TTL-bounded attribute caches with a do-not-retry sentinel
//! - [`store`]: the privilege store and its scope-gated inheritance
//! - [`adapter`]: external attribute sources
//! - [`reader`]: internal and external readers
//! - [`factory`]: per-zone reader selection from connector configuration

pub mod adapter;
pub mod cache;
pub mod error;
pub mod factory;
pub mod reader;
pub mod store;

pub use adapter::{
    AdapterConnection, AdapterProvider, AttributeAdapter, StaticAdapterProvider,
    StaticAttributeAdapter,
};
pub use cache::{
    AttributeCache, CacheState, CachedAttributes, DEFAULT_ATTRIBUTE_TTL, InMemoryAttributeCache,
    NoOpAttributeCache, cache_key,
};
pub use error::{AdapterError, AttributeRetrievalError, Result, StoreError};
pub use factory::{
    AttributeConnector, AttributeReaderFactory, DEFAULT_MAX_CACHED_INTERVAL_MINUTES, ReaderSettings,
    ZoneConnectors,
};
pub use reader::{
    AttributeLimits, ExternalAttributeReader, InternalResourceAttributeReader,
    InternalSubjectAttributeReader, ResourceAttributeReader, SubjectAttributeReader,
};
pub use store::{
    EntityRecord, InMemoryPrivilegeStore, MAX_INHERITANCE_DEPTH, Parent, PrivilegeStore,
    ResolvedEntity,
};
