//! Per-zone reader selection.
//!
//! A zone whose connector for an entity kind is active reads that kind
//! through external adapters; otherwise it reads from the privilege store.
//! Readers are built on first use and memoized until the zone's connectors
//! change or the zone is removed. Every connector change gets a fresh
//! generation; a reader built from connectors that were replaced while it
//! was being built is discarded and rebuilt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warrant_types::{Clock, EntityKind, SystemClock, ZoneId};

use crate::adapter::{AdapterConnection, AdapterProvider, AttributeAdapter};
use crate::cache::{AttributeCache, InMemoryAttributeCache, NoOpAttributeCache};
use crate::error::{AttributeRetrievalError, Result};
use crate::reader::{
    AttributeLimits, ExternalAttributeReader, InternalResourceAttributeReader,
    InternalSubjectAttributeReader, ResourceAttributeReader, SubjectAttributeReader,
};
use crate::store::PrivilegeStore;

/// Default connector cache interval, in minutes.
pub const DEFAULT_MAX_CACHED_INTERVAL_MINUTES: u64 = 480;

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    DEFAULT_MAX_CACHED_INTERVAL_MINUTES
}

/// External attribute source for one entity kind of a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConnector {
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Lifetime of cached adapter results.
    #[serde(default = "default_interval")]
    pub max_cached_interval_minutes: u64,
    #[serde(default)]
    pub adapters: Vec<AdapterConnection>,
}

impl AttributeConnector {
    pub fn new(adapters: Vec<AdapterConnection>) -> Self {
        Self {
            is_active: true,
            max_cached_interval_minutes: DEFAULT_MAX_CACHED_INTERVAL_MINUTES,
            adapters,
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.max_cached_interval_minutes.saturating_mul(60))
    }
}

/// Connectors configured for a zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConnectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<AttributeConnector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<AttributeConnector>,
}

impl ZoneConnectors {
    fn active(&self, kind: EntityKind) -> Option<&AttributeConnector> {
        let connector = match kind {
            EntityKind::Resource => self.resource.as_ref(),
            EntityKind::Subject => self.subject.as_ref(),
        };
        connector.filter(|c| c.is_active)
    }
}

/// Settings shared by every external reader the factory builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    /// When `false`, external readers use [`NoOpAttributeCache`].
    pub cache_enabled: bool,
    pub limits: AttributeLimits,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            limits: AttributeLimits::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct Configured {
    generation: u64,
    connectors: ZoneConnectors,
}

/// Builds and memoizes attribute readers per zone.
pub struct AttributeReaderFactory {
    store: Arc<dyn PrivilegeStore>,
    adapters: Arc<dyn AdapterProvider>,
    settings: ReaderSettings,
    clock: Arc<dyn Clock>,
    generations: AtomicU64,
    /// A missing zone has generation 0 and default connectors.
    connectors: RwLock<HashMap<ZoneId, Configured>>,
    resource_readers: RwLock<HashMap<ZoneId, Arc<dyn ResourceAttributeReader>>>,
    subject_readers: RwLock<HashMap<ZoneId, Arc<dyn SubjectAttributeReader>>>,
}

impl AttributeReaderFactory {
    pub fn new(
        store: Arc<dyn PrivilegeStore>,
        adapters: Arc<dyn AdapterProvider>,
        settings: ReaderSettings,
    ) -> Self {
        Self::with_clock(store, adapters, settings, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        store: Arc<dyn PrivilegeStore>,
        adapters: Arc<dyn AdapterProvider>,
        settings: ReaderSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            adapters,
            settings,
            clock,
            generations: AtomicU64::new(0),
            connectors: RwLock::new(HashMap::new()),
            resource_readers: RwLock::new(HashMap::new()),
            subject_readers: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the zone's connectors and drops its memoized readers, along
    /// with their caches.
    pub fn set_connectors(&self, zone: &ZoneId, connectors: ZoneConnectors) {
        info!(
            zone = %zone,
            resource_external = connectors.active(EntityKind::Resource).is_some(),
            subject_external = connectors.active(EntityKind::Subject).is_some(),
            "attribute connectors updated"
        );
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        self.connectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(zone.clone(), Configured { generation, connectors });
        self.drop_readers(zone);
    }

    pub fn connectors(&self, zone: &ZoneId) -> ZoneConnectors {
        self.configured(zone).1
    }

    fn configured(&self, zone: &ZoneId) -> (u64, ZoneConnectors) {
        self.connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(zone)
            .map(|configured| (configured.generation, configured.connectors.clone()))
            .unwrap_or_default()
    }

    fn generation(&self, zone: &ZoneId) -> u64 {
        self.connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(zone)
            .map_or(0, |configured| configured.generation)
    }

    /// Forgets everything about a zone.
    pub fn remove_zone(&self, zone: &ZoneId) {
        self.connectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(zone);
        self.drop_readers(zone);
    }

    fn drop_readers(&self, zone: &ZoneId) {
        self.resource_readers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(zone);
        self.subject_readers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(zone);
    }

    pub fn resource_reader(&self, zone: &ZoneId) -> Result<Arc<dyn ResourceAttributeReader>> {
        self.memoized(zone, &self.resource_readers, |connectors| {
            let reader: Arc<dyn ResourceAttributeReader> = match self.external(zone, EntityKind::Resource, connectors)? {
                Some(external) => external,
                None => Arc::new(InternalResourceAttributeReader::new(zone.clone(), Arc::clone(&self.store))),
            };
            Ok(reader)
        })
    }

    pub fn subject_reader(&self, zone: &ZoneId) -> Result<Arc<dyn SubjectAttributeReader>> {
        self.memoized(zone, &self.subject_readers, |connectors| {
            let reader: Arc<dyn SubjectAttributeReader> = match self.external(zone, EntityKind::Subject, connectors)? {
                Some(external) => external,
                None => Arc::new(InternalSubjectAttributeReader::new(zone.clone(), Arc::clone(&self.store))),
            };
            Ok(reader)
        })
    }

    /// Returns the memoized reader or builds one outside any lock.
    ///
    /// The generation is re-checked under the readers lock, which
    /// `set_connectors` takes after publishing new connectors, so a stale
    /// reader is either never stored or dropped right after.
    fn memoized<R: ?Sized>(
        &self,
        zone: &ZoneId,
        readers: &RwLock<HashMap<ZoneId, Arc<R>>>,
        build: impl Fn(&ZoneConnectors) -> Result<Arc<R>>,
    ) -> Result<Arc<R>> {
        if let Some(reader) = readers.read().unwrap_or_else(PoisonError::into_inner).get(zone) {
            return Ok(Arc::clone(reader));
        }

        loop {
            let (generation, connectors) = self.configured(zone);
            let reader = build(&connectors)?;

            let mut readers = readers.write().unwrap_or_else(PoisonError::into_inner);
            if self.generation(zone) == generation {
                return Ok(Arc::clone(readers.entry(zone.clone()).or_insert(reader)));
            }
            debug!(zone = %zone, "connectors changed while building a reader; rebuilding");
        }
    }

    /// Builds an external reader when `connectors` has an active connector
    /// for `kind`.
    fn external(
        &self,
        zone: &ZoneId,
        kind: EntityKind,
        connectors: &ZoneConnectors,
    ) -> Result<Option<Arc<ExternalAttributeReader>>> {
        let Some(connector) = connectors.active(kind) else {
            debug!(zone = %zone, kind = %kind, "using privilege store reader");
            return Ok(None);
        };

        let adapters = connector
            .adapters
            .iter()
            .map(|connection| {
                self.adapters
                    .adapter(connection)
                    .map_err(|source| AttributeRetrievalError::Adapter {
                        endpoint: connection.endpoint.clone(),
                        identifier: String::new(),
                        source,
                    })
            })
            .collect::<Result<Vec<Arc<dyn AttributeAdapter>>>>()?;

        let cache: Arc<dyn AttributeCache> = if self.settings.cache_enabled {
            Arc::new(InMemoryAttributeCache::with_clock(
                kind,
                connector.cache_ttl(),
                Arc::clone(&self.clock),
            ))
        } else {
            Arc::new(NoOpAttributeCache)
        };

        debug!(zone = %zone, kind = %kind, adapters = adapters.len(), "using external attribute reader");
        Ok(Some(Arc::new(ExternalAttributeReader::new(
            zone.clone(),
            kind,
            adapters,
            cache,
            self.settings.limits,
        ))))
    }
}
