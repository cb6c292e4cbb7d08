//! Attribute caches.
//!
//! One cache instance serves one entity kind. Keys are namespaced by kind and
//! zone and carry the full BLAKE3 digest of the identifier:
//!
//! ```text
//! resource:zone-1:3f1c...e9   (64 hex characters)
//! ```
//!
//! Values are stored as JSON bytes so the in-memory backend behaves like an
//! external key/value store. A value that fails to (de)serialize is logged
//! and treated as a miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warrant_types::{AttributeSet, Clock, EntityKind, SystemClock, ZoneId, duration_ns};

/// Default lifetime of cached attributes.
pub const DEFAULT_ATTRIBUTE_TTL: Duration = Duration::from_secs(480 * 60);

/// Number of writes between sweeps of expired entries.
pub const SWEEP_INTERVAL: usize = 1024;

// ============================================================================
// Cached Value
// ============================================================================

/// Outcome of the lookup that produced a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheState {
    Success,
    /// The lookup failed; callers must not retry until the entry expires.
    DoNotRetry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAttributes {
    pub state: CacheState,
    pub attributes: AttributeSet,
}

impl CachedAttributes {
    pub fn success(attributes: AttributeSet) -> Self {
        Self {
            state: CacheState::Success,
            attributes,
        }
    }

    pub fn do_not_retry() -> Self {
        Self {
            state: CacheState::DoNotRetry,
            attributes: AttributeSet::new(),
        }
    }
}

// ============================================================================
// Cache Trait
// ============================================================================

/// Key/value cache of resolved attributes.
pub trait AttributeCache: Send + Sync {
    fn set(&self, zone: &ZoneId, identifier: &str, value: &CachedAttributes);

    fn get(&self, zone: &ZoneId, identifier: &str) -> Option<CachedAttributes>;

    fn flush_all(&self);
}

/// Builds the cache key for an identifier.
pub fn cache_key(kind: EntityKind, zone: &ZoneId, identifier: &str) -> String {
    format!(
        "{kind}:{zone}:{}",
        blake3::hash(identifier.as_bytes()).to_hex()
    )
}

// ============================================================================
// In-Memory Cache
// ============================================================================

#[derive(Debug)]
struct Entry {
    payload: Vec<u8>,
    expires_at_ns: u64,
}

/// Process-local attribute cache with per-entry expiry.
///
/// Expired entries are dropped when read, and every [`SWEEP_INTERVAL`]
/// writes [`evict_expired`](Self::evict_expired) sweeps the rest.
#[derive(Debug)]
pub struct InMemoryAttributeCache {
    kind: EntityKind,
    ttl_ns: u64,
    clock: Arc<dyn Clock>,
    writes: AtomicUsize,
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryAttributeCache {
    pub fn new(kind: EntityKind, ttl: Duration) -> Self {
        Self::with_clock(kind, ttl, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(kind: EntityKind, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            ttl_ns: duration_ns(ttl),
            clock,
            writes: AtomicUsize::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now_ns();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at_ns > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Entries are replaced whole, so a poisoned map is still consistent.
impl AttributeCache for InMemoryAttributeCache {
    fn set(&self, zone: &ZoneId, identifier: &str, value: &CachedAttributes) {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(zone = %zone, identifier, error = %e, "failed to serialize cached attributes");
                return;
            }
        };
        let entry = Entry {
            payload,
            expires_at_ns: self.clock.now_ns().saturating_add(self.ttl_ns),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cache_key(self.kind, zone, identifier), entry);

        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            let evicted = self.evict_expired();
            debug!(kind = %self.kind, evicted, "swept attribute cache");
        }
    }

    fn get(&self, zone: &ZoneId, identifier: &str) -> Option<CachedAttributes> {
        let key = cache_key(self.kind, zone, identifier);
        let now = self.clock.now_ns();

        let decoded = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let entry = entries.get(&key)?;
            if entry.expires_at_ns > now {
                Some(serde_json::from_slice::<CachedAttributes>(&entry.payload))
            } else {
                None
            }
        };

        match decoded {
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                warn!(zone = %zone, identifier, error = %e, "failed to deserialize cached attributes");
                None
            }
            None => {
                debug!(zone = %zone, identifier, kind = %self.kind, "attribute cache entry expired");
                let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
                if entries.get(&key).is_some_and(|e| e.expires_at_ns <= now) {
                    entries.remove(&key);
                }
                None
            }
        }
    }

    fn flush_all(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// ============================================================================
// No-Op Cache
// ============================================================================

/// Cache that stores nothing; used when attribute caching is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAttributeCache;

impl AttributeCache for NoOpAttributeCache {
    fn set(&self, _zone: &ZoneId, _identifier: &str, _value: &CachedAttributes) {}

    fn get(&self, _zone: &ZoneId, _identifier: &str) -> Option<CachedAttributes> {
        None
    }

    fn flush_all(&self) {}
}

// ============================================================================
// Tests
// ============================================================================
