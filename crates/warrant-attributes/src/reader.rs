//! Attribute readers.
//!
//! A reader resolves the attributes of one entity kind within one zone.
//! Internal readers consult the [`PrivilegeStore`]; external readers call
//! adapters through an [`AttributeCache`].

use std::sync::Arc;

use tracing::{debug, warn};
use warrant_types::{AttributeSet, EntityKind, ZoneId};

use crate::adapter::AttributeAdapter;
use crate::cache::{AttributeCache, CacheState, CachedAttributes};
use crate::error::{AttributeRetrievalError, Result};
use crate::store::PrivilegeStore;

/// Resolves resource attributes.
pub trait ResourceAttributeReader: Send + Sync {
    fn attributes(&self, identifier: &str) -> Result<AttributeSet>;
}

/// Resolves subject attributes, optionally under inheritance scopes.
pub trait SubjectAttributeReader: Send + Sync {
    fn attributes(&self, identifier: &str) -> Result<AttributeSet>;

    fn attributes_by_scope(&self, identifier: &str, scopes: &AttributeSet) -> Result<AttributeSet>;
}

// ============================================================================
// Internal Readers
// ============================================================================

/// Reads resources from the privilege store. Resources have no request-time
/// scope, so only unscoped parent edges are followed.
pub struct InternalResourceAttributeReader {
    zone: ZoneId,
    store: Arc<dyn PrivilegeStore>,
}

impl InternalResourceAttributeReader {
    pub fn new(zone: ZoneId, store: Arc<dyn PrivilegeStore>) -> Self {
        Self { zone, store }
    }
}

impl ResourceAttributeReader for InternalResourceAttributeReader {
    fn attributes(&self, identifier: &str) -> Result<AttributeSet> {
        let entity = self
            .store
            .entity_with_inherited_attributes(&self.zone, EntityKind::Resource, identifier, None)?;
        Ok(entity.map(|e| e.attributes).unwrap_or_default())
    }
}

/// Reads subjects from the privilege store.
pub struct InternalSubjectAttributeReader {
    zone: ZoneId,
    store: Arc<dyn PrivilegeStore>,
}

impl InternalSubjectAttributeReader {
    pub fn new(zone: ZoneId, store: Arc<dyn PrivilegeStore>) -> Self {
        Self { zone, store }
    }

    fn resolve(&self, identifier: &str, scopes: Option<&AttributeSet>) -> Result<AttributeSet> {
        let entity = self
            .store
            .entity_with_inherited_attributes(&self.zone, EntityKind::Subject, identifier, scopes)?;
        Ok(entity.map(|e| e.attributes).unwrap_or_default())
    }
}

impl SubjectAttributeReader for InternalSubjectAttributeReader {
    fn attributes(&self, identifier: &str) -> Result<AttributeSet> {
        self.resolve(identifier, None)
    }

    fn attributes_by_scope(&self, identifier: &str, scopes: &AttributeSet) -> Result<AttributeSet> {
        self.resolve(identifier, Some(scopes))
    }
}

// ============================================================================
// External Reader
// ============================================================================

/// Size limits applied to attributes returned by adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLimits {
    pub max_attributes: usize,
    /// Maximum JSON-serialized size of the attribute set.
    pub max_size_bytes: usize,
}

impl Default for AttributeLimits {
    fn default() -> Self {
        Self {
            max_attributes: 1500,
            max_size_bytes: 500_000,
        }
    }
}

impl AttributeLimits {
    fn check(&self, identifier: &str, attributes: &AttributeSet) -> Result<()> {
        if attributes.len() > self.max_attributes {
            return Err(AttributeRetrievalError::LimitExceeded {
                identifier: identifier.to_string(),
                reason: format!(
                    "{} attributes returned, maximum is {}",
                    attributes.len(),
                    self.max_attributes
                ),
            });
        }
        let size = serde_json::to_vec(attributes).map_or(usize::MAX, |bytes| bytes.len());
        if size > self.max_size_bytes {
            return Err(AttributeRetrievalError::LimitExceeded {
                identifier: identifier.to_string(),
                reason: format!("{size} bytes returned, maximum is {}", self.max_size_bytes),
            });
        }
        Ok(())
    }
}

/// Reads attributes from external adapters, caching results per identifier.
///
/// Failures are cached as [`CacheState::DoNotRetry`] so a failing adapter is
/// not called again until the entry expires.
pub struct ExternalAttributeReader {
    zone: ZoneId,
    kind: EntityKind,
    adapters: Vec<Arc<dyn AttributeAdapter>>,
    cache: Arc<dyn AttributeCache>,
    limits: AttributeLimits,
}

impl ExternalAttributeReader {
    pub fn new(
        zone: ZoneId,
        kind: EntityKind,
        adapters: Vec<Arc<dyn AttributeAdapter>>,
        cache: Arc<dyn AttributeCache>,
        limits: AttributeLimits,
    ) -> Self {
        Self {
            zone,
            kind,
            adapters,
            cache,
            limits,
        }
    }

    fn resolve(&self, identifier: &str) -> Result<AttributeSet> {
        match self.cache.get(&self.zone, identifier) {
            Some(CachedAttributes {
                state: CacheState::Success,
                attributes,
            }) => {
                debug!(zone = %self.zone, kind = %self.kind, identifier, "attribute cache hit");
                return Ok(attributes);
            }
            Some(CachedAttributes {
                state: CacheState::DoNotRetry,
                ..
            }) => {
                debug!(zone = %self.zone, kind = %self.kind, identifier, "cached retrieval failure");
                return Err(AttributeRetrievalError::DoNotRetry {
                    identifier: identifier.to_string(),
                });
            }
            None => {}
        }

        match self.fetch(identifier) {
            Ok(attributes) => {
                self.cache
                    .set(&self.zone, identifier, &CachedAttributes::success(attributes.clone()));
                Ok(attributes)
            }
            Err(e) => {
                warn!(zone = %self.zone, kind = %self.kind, identifier, error = %e, "attribute retrieval failed");
                self.cache
                    .set(&self.zone, identifier, &CachedAttributes::do_not_retry());
                Err(e)
            }
        }
    }

    fn fetch(&self, identifier: &str) -> Result<AttributeSet> {
        let mut attributes = AttributeSet::new();
        for adapter in &self.adapters {
            let fetched = adapter
                .fetch_attributes(identifier)
                .map_err(|source| AttributeRetrievalError::Adapter {
                    endpoint: adapter.endpoint().to_string(),
                    identifier: identifier.to_string(),
                    source,
                })?;
            attributes.merge(&fetched);
        }
        self.limits.check(identifier, &attributes)?;
        Ok(attributes)
    }
}

impl ResourceAttributeReader for ExternalAttributeReader {
    fn attributes(&self, identifier: &str) -> Result<AttributeSet> {
        self.resolve(identifier)
    }
}

/// External subjects have no inheritance, so scopes are ignored.
impl SubjectAttributeReader for ExternalAttributeReader {
    fn attributes(&self, identifier: &str) -> Result<AttributeSet> {
        self.resolve(identifier)
    }

    fn attributes_by_scope(&self, identifier: &str, _scopes: &AttributeSet) -> Result<AttributeSet> {
        self.resolve(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticAttributeAdapter;
    use crate::cache::{DEFAULT_ATTRIBUTE_TTL, InMemoryAttributeCache, NoOpAttributeCache};
    use crate::error::AdapterError;
    use crate::store::{EntityRecord, InMemoryPrivilegeStore, Parent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;
    use warrant_types::Attribute;

    /// Counts calls and answers with a fixed result.
    #[derive(Debug)]
    struct CountingAdapter {
        calls: AtomicUsize,
        result: std::result::Result<AttributeSet, AdapterError>,
    }

    impl CountingAdapter {
        fn ok(attributes: AttributeSet) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Ok(attributes),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Err(AdapterError::Failed {
                    endpoint: "https://attrs".into(),
                    message: "503 Service Unavailable".into(),
                }),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AttributeAdapter for CountingAdapter {
        fn endpoint(&self) -> &str {
            "https://attrs"
        }

        fn fetch_attributes(&self, _identifier: &str) -> std::result::Result<AttributeSet, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn zone() -> ZoneId {
        ZoneId::from("zone-1")
    }

    fn external(adapters: Vec<Arc<dyn AttributeAdapter>>, cache: Arc<dyn AttributeCache>) -> ExternalAttributeReader {
        ExternalAttributeReader::new(zone(), EntityKind::Resource, adapters, cache, AttributeLimits::default())
    }

    fn resource_cache() -> Arc<InMemoryAttributeCache> {
        Arc::new(InMemoryAttributeCache::new(EntityKind::Resource, DEFAULT_ATTRIBUTE_TTL))
    }

    #[test]
    fn cache_hit_skips_adapters() {
        let adapter = CountingAdapter::ok(vec![Attribute::new("i", "site", "sj")].into());
        let reader = external(vec![adapter.clone() as Arc<dyn AttributeAdapter>], resource_cache());

        let first = ResourceAttributeReader::attributes(&reader, "/sites/sj").unwrap();
        let second = ResourceAttributeReader::attributes(&reader, "/sites/sj").unwrap();
        assert_eq!(first, second);
        assert_eq!(adapter.calls(), 1);
    }

    #[test]
    fn empty_result_is_cached_as_success() {
        let adapter = CountingAdapter::ok(AttributeSet::new());
        let cache = resource_cache();
        let reader = external(vec![adapter.clone() as Arc<dyn AttributeAdapter>], cache.clone());

        assert!(ResourceAttributeReader::attributes(&reader, "/x").unwrap().is_empty());
        assert_eq!(cache.get(&zone(), "/x").unwrap().state, CacheState::Success);
        assert!(ResourceAttributeReader::attributes(&reader, "/x").unwrap().is_empty());
        assert_eq!(adapter.calls(), 1);
    }

    #[test]
    fn adapter_failure_is_cached_as_do_not_retry() {
        let adapter = CountingAdapter::failing();
        let reader = external(vec![adapter.clone() as Arc<dyn AttributeAdapter>], resource_cache());

        let err = ResourceAttributeReader::attributes(&reader, "/x").unwrap_err();
        assert!(matches!(err, AttributeRetrievalError::Adapter { ref endpoint, .. } if endpoint == "https://attrs"));

        let err = ResourceAttributeReader::attributes(&reader, "/x").unwrap_err();
        assert!(matches!(err, AttributeRetrievalError::DoNotRetry { .. }));
        assert_eq!(adapter.calls(), 1, "failing adapter not retried");
    }

    #[test]
    fn without_cache_failures_retry() {
        let adapter = CountingAdapter::failing();
        let reader = external(vec![adapter.clone() as Arc<dyn AttributeAdapter>], Arc::new(NoOpAttributeCache));
        assert!(ResourceAttributeReader::attributes(&reader, "/x").is_err());
        assert!(ResourceAttributeReader::attributes(&reader, "/x").is_err());
        assert_eq!(adapter.calls(), 2);
    }

    #[test]
    fn adapters_are_unioned() {
        let a = Arc::new(
            StaticAttributeAdapter::new("https://a").with_attributes("bob", vec![Attribute::new("i", "role", "admin")].into()),
        );
        let b = Arc::new(
            StaticAttributeAdapter::new("https://b").with_attributes("bob", vec![Attribute::new("i", "site", "sj")].into()),
        );
        let reader = ExternalAttributeReader::new(
            zone(),
            EntityKind::Subject,
            vec![a as Arc<dyn AttributeAdapter>, b],
            Arc::new(InMemoryAttributeCache::new(EntityKind::Subject, DEFAULT_ATTRIBUTE_TTL)),
            AttributeLimits::default(),
        );
        let attrs = SubjectAttributeReader::attributes(&reader, "bob").unwrap();
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn limits_are_enforced_and_cached() {
        let many: AttributeSet = (0..5).map(|i| Attribute::new("i", "n", i.to_string())).collect();
        let adapter = CountingAdapter::ok(many);
        let reader = ExternalAttributeReader::new(
            zone(),
            EntityKind::Resource,
            vec![adapter.clone() as Arc<dyn AttributeAdapter>],
            resource_cache(),
            AttributeLimits {
                max_attributes: 3,
                max_size_bytes: 500_000,
            },
        );
        assert!(matches!(
            ResourceAttributeReader::attributes(&reader, "/x"),
            Err(AttributeRetrievalError::LimitExceeded { .. })
        ));
        assert!(matches!(
            ResourceAttributeReader::attributes(&reader, "/x"),
            Err(AttributeRetrievalError::DoNotRetry { .. })
        ));
    }

    #[test_case(10, 100, false ; "over size")]
    #[test_case(0, 10_000, false ; "over count")]
    #[test_case(1, 10_000, true ; "at the count limit")]
    fn limits(max_attributes: usize, max_size_bytes: usize, accepted: bool) {
        let adapter = CountingAdapter::ok(vec![Attribute::new("i", "n", "x".repeat(200))].into());
        let reader = ExternalAttributeReader::new(
            zone(),
            EntityKind::Resource,
            vec![adapter as Arc<dyn AttributeAdapter>],
            Arc::new(NoOpAttributeCache),
            AttributeLimits {
                max_attributes,
                max_size_bytes,
            },
        );
        let result = ResourceAttributeReader::attributes(&reader, "/x");
        if accepted {
            assert_eq!(result.unwrap().len(), 1);
        } else {
            assert!(matches!(result, Err(AttributeRetrievalError::LimitExceeded { .. })));
        }
    }

    #[test]
    fn internal_subject_reader_passes_scopes() {
        let store = Arc::new(InMemoryPrivilegeStore::new());
        let site = Attribute::new("i", "site", "sj");
        store
            .upsert(
                &zone(),
                EntityKind::Subject,
                EntityRecord::new("bob", AttributeSet::new()).with_parent(Parent::scoped("sj-admins", site.clone())),
            )
            .unwrap();
        store
            .upsert(
                &zone(),
                EntityKind::Subject,
                EntityRecord::new("sj-admins", vec![Attribute::new("i", "role", "admin")].into()),
            )
            .unwrap();

        let reader = InternalSubjectAttributeReader::new(zone(), store);
        assert!(reader.attributes("bob").unwrap().is_empty());
        let scopes: AttributeSet = vec![site].into();
        assert_eq!(reader.attributes_by_scope("bob", &scopes).unwrap().len(), 1);
        assert!(reader.attributes("nobody").unwrap().is_empty());
    }

    #[test]
    fn internal_resource_reader_reads_store() {
        let store = Arc::new(InMemoryPrivilegeStore::new());
        store
            .upsert(
                &zone(),
                EntityKind::Resource,
                EntityRecord::new("/sites/sj", vec![Attribute::new("i", "site", "sj")].into()),
            )
            .unwrap();
        let reader = InternalResourceAttributeReader::new(zone(), store);
        assert_eq!(reader.attributes("/sites/sj").unwrap().len(), 1);
        assert!(reader.attributes("/sites/other").unwrap().is_empty());
    }
}
