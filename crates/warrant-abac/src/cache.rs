//! Decision caching.
//!
//! Decisions are keyed by a blake3 fingerprint of the request. Each entry
//! remembers the zone, subject, resources and policy sets it depended on.
//! Entries evaluated without an explicit order also depend on the zone's
//! policy-set catalog, which changes whenever a set is stored or removed.
//! Invalidation hooks stamp the thing that changed with a sequence number;
//! an entry is served only if its evaluation started after every stamp that
//! touches it.
//!
//! ```text
//! begin() ──► evaluate ──► set(key, started, trace)
//!                  ▲
//! reset_for_*() ───┘ stamps newer than `started` make the entry stale
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use warrant_types::{AttributeSet, Clock, SystemClock, ZoneId, canonicalize, duration_ns};

use crate::error::Result;
use crate::evaluator::{
    EvaluationTrace, PolicyEvaluationOrchestrator, PolicyEvaluationRequest, PolicyEvaluationResult,
    PolicyEvaluator,
};

/// Default lifetime of a cached decision.
pub const DEFAULT_DECISION_TTL: Duration = Duration::from_secs(10 * 60);

/// Number of writes and invalidations between sweeps of expired entries
/// and obsolete stamps.
pub const SWEEP_INTERVAL: u64 = 1024;

// ============================================================================
// Key
// ============================================================================

/// Identity of a cached decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub zone: ZoneId,
    pub subject: String,
    /// Canonical form of the request resource URI.
    pub resource: String,
    /// blake3 hex digest of the canonical request rendering.
    pub fingerprint: String,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    zone: &'a ZoneId,
    subject: &'a str,
    resource: &'a str,
    action: &'a str,
    subject_attributes: &'a AttributeSet,
    resource_attributes: &'a AttributeSet,
    policy_sets_evaluation_order: &'a [String],
}

impl DecisionKey {
    pub fn new(zone: &ZoneId, request: &PolicyEvaluationRequest) -> serde_json::Result<Self> {
        let resource = canonicalize(&request.resource_identifier);
        let input = FingerprintInput {
            zone,
            subject: &request.subject_identifier,
            resource: &resource,
            action: &request.action,
            subject_attributes: &request.subject_attributes,
            resource_attributes: &request.resource_attributes,
            policy_sets_evaluation_order: &request.policy_sets_evaluation_order,
        };
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, &input)?;

        Ok(Self {
            zone: zone.clone(),
            subject: request.subject_identifier.clone(),
            resource,
            fingerprint: hasher.finalize().to_hex().to_string(),
        })
    }
}

// ============================================================================
// Cache Contract
// ============================================================================

pub trait PolicyEvaluationCache: Send + Sync {
    /// Marks the start of an evaluation whose result may be cached.
    fn begin(&self) -> u64;

    fn get(&self, key: &DecisionKey) -> Option<PolicyEvaluationResult>;

    /// Caches the outcome of an evaluation opened with [`Self::begin`].
    fn set(&self, key: &DecisionKey, started: u64, trace: &EvaluationTrace);

    fn reset_for_subject(&self, zone: &ZoneId, subject: &str);

    fn reset_for_resource(&self, zone: &ZoneId, resource: &str);

    /// Called whenever a set is stored, replaced or removed. Also
    /// invalidates decisions that depended on which sets the zone holds.
    fn reset_for_policy_set(&self, zone: &ZoneId, policy_set: &str);

    fn reset_for_zone(&self, zone: &ZoneId);

    fn flush_all(&self);
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPolicyEvaluationCache;

impl PolicyEvaluationCache for NoOpPolicyEvaluationCache {
    fn begin(&self) -> u64 {
        0
    }

    fn get(&self, _key: &DecisionKey) -> Option<PolicyEvaluationResult> {
        None
    }

    fn set(&self, _key: &DecisionKey, _started: u64, _trace: &EvaluationTrace) {}

    fn reset_for_subject(&self, _zone: &ZoneId, _subject: &str) {}

    fn reset_for_resource(&self, _zone: &ZoneId, _resource: &str) {}

    fn reset_for_policy_set(&self, _zone: &ZoneId, _policy_set: &str) {}

    fn reset_for_zone(&self, _zone: &ZoneId) {}

    fn flush_all(&self) {}
}

// ============================================================================
// In-Memory Cache
// ============================================================================

#[derive(Debug)]
struct Entry {
    result: PolicyEvaluationResult,
    /// Request URI plus every URI resolved through attribute URI templates.
    resources: BTreeSet<String>,
    policy_sets: BTreeSet<String>,
    follows_zone_catalog: bool,
    started: u64,
    expires_at_ns: u64,
}

type Scoped = (ZoneId, String);

#[derive(Debug, Default)]
struct Invalidations {
    zones: HashMap<ZoneId, u64>,
    catalogs: HashMap<ZoneId, u64>,
    subjects: HashMap<Scoped, u64>,
    resources: HashMap<Scoped, u64>,
    policy_sets: HashMap<Scoped, u64>,
}

impl Invalidations {
    /// Newest stamp that applies to `entry`, or 0.
    fn latest(&self, key: &DecisionKey, entry: &Entry) -> u64 {
        let scoped = |map: &HashMap<Scoped, u64>, name: &str| {
            map.get(&(key.zone.clone(), name.to_string())).copied().unwrap_or(0)
        };

        let mut latest = self.zones.get(&key.zone).copied().unwrap_or(0);
        latest = latest.max(scoped(&self.subjects, &key.subject));
        for resource in &entry.resources {
            latest = latest.max(scoped(&self.resources, resource));
        }
        for policy_set in &entry.policy_sets {
            latest = latest.max(scoped(&self.policy_sets, policy_set));
        }
        if entry.follows_zone_catalog {
            latest = latest.max(self.catalogs.get(&key.zone).copied().unwrap_or(0));
        }
        latest
    }

    fn retain_from(&mut self, floor: u64) {
        self.zones.retain(|_, stamp| *stamp >= floor);
        self.catalogs.retain(|_, stamp| *stamp >= floor);
        self.subjects.retain(|_, stamp| *stamp >= floor);
        self.resources.retain(|_, stamp| *stamp >= floor);
        self.policy_sets.retain(|_, stamp| *stamp >= floor);
    }

    fn len(&self) -> usize {
        self.zones.len()
            + self.catalogs.len()
            + self.subjects.len()
            + self.resources.len()
            + self.policy_sets.len()
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<DecisionKey, Entry>,
    invalidations: Invalidations,
    /// Evaluations that began before this sequence are not cached.
    floor: u64,
}

/// In-process decision cache with TTL expiry and stamp-based invalidation.
///
/// Every [`SWEEP_INTERVAL`] writes the cache runs
/// [`evict_expired`](Self::evict_expired) on itself, so neither entries nor
/// stamps outlive the TTL by much.
#[derive(Debug)]
pub struct InMemoryPolicyEvaluationCache {
    ttl_ns: u64,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
    writes: AtomicU64,
    state: RwLock<State>,
}

impl InMemoryPolicyEvaluationCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl_ns: duration_ns(ttl),
            clock,
            sequence: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            state: RwLock::new(State::default()),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn stamp(&self, record: impl FnOnce(&mut Invalidations, u64)) {
        let sequence = self.next_sequence();
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            record(&mut state.invalidations, sequence);
        }
        self.wrote();
    }

    fn wrote(&self) {
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.evict_expired();
        }
    }

    /// Drops expired entries and invalidation stamps no live entry can be
    /// affected by.
    pub fn evict_expired(&self) {
        let now = self.clock.now_ns();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.retain(|_, entry| entry.expires_at_ns > now);

        let floor = state
            .entries
            .values()
            .map(|entry| entry.started)
            .min()
            .unwrap_or_else(|| self.sequence.load(Ordering::SeqCst) + 1);
        state.invalidations.retain_from(floor);
        state.floor = state.floor.max(floor);
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of invalidation stamps currently retained.
    pub fn invalidation_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidations
            .len()
    }
}

impl Default for InMemoryPolicyEvaluationCache {
    fn default() -> Self {
        Self::new(DEFAULT_DECISION_TTL)
    }
}

impl PolicyEvaluationCache for InMemoryPolicyEvaluationCache {
    fn begin(&self) -> u64 {
        self.next_sequence()
    }

    fn get(&self, key: &DecisionKey) -> Option<PolicyEvaluationResult> {
        let now = self.clock.now_ns();
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            let entry = state.entries.get(key)?;
            if entry.expires_at_ns > now && state.invalidations.latest(key, entry) < entry.started {
                return Some(entry.result.clone());
            }
        }

        debug!(zone = %key.zone, subject = %key.subject, "dropping stale decision");
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(key);
        None
    }

    fn set(&self, key: &DecisionKey, started: u64, trace: &EvaluationTrace) {
        let mut policy_sets: BTreeSet<String> = trace.policy_sets.iter().cloned().collect();
        policy_sets.extend(trace.evaluation_order.iter().cloned());
        let mut resources: BTreeSet<String> = trace
            .result
            .resolved_resource_uris
            .iter()
            .map(|uri| canonicalize(uri))
            .collect();
        resources.insert(key.resource.clone());

        let entry = Entry {
            result: trace.result.clone(),
            resources,
            policy_sets,
            follows_zone_catalog: trace.follows_zone_catalog,
            started,
            expires_at_ns: self.clock.now_ns().saturating_add(self.ttl_ns),
        };

        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if started < state.floor {
                debug!(zone = %key.zone, "decision began before the last flush or sweep; not caching");
                return;
            }
            state.entries.insert(key.clone(), entry);
        }
        self.wrote();
    }

    fn reset_for_subject(&self, zone: &ZoneId, subject: &str) {
        self.stamp(|invalidations, sequence| {
            invalidations
                .subjects
                .insert((zone.clone(), subject.to_string()), sequence);
        });
    }

    fn reset_for_resource(&self, zone: &ZoneId, resource: &str) {
        self.stamp(|invalidations, sequence| {
            invalidations
                .resources
                .insert((zone.clone(), canonicalize(resource)), sequence);
        });
    }

    fn reset_for_policy_set(&self, zone: &ZoneId, policy_set: &str) {
        self.stamp(|invalidations, sequence| {
            invalidations
                .policy_sets
                .insert((zone.clone(), policy_set.to_string()), sequence);
            invalidations.catalogs.insert(zone.clone(), sequence);
        });
    }

    fn reset_for_zone(&self, zone: &ZoneId) {
        self.stamp(|invalidations, sequence| {
            invalidations.zones.insert(zone.clone(), sequence);
        });
    }

    fn flush_all(&self) {
        let floor = self.next_sequence();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.invalidations = Invalidations::default();
        state.floor = floor;
    }
}

// ============================================================================
// Caching Evaluator
// ============================================================================

/// Serves decisions from a [`PolicyEvaluationCache`], evaluating on a miss.
///
/// Errors are returned as-is and never cached.
pub struct CachingPolicyEvaluator {
    inner: PolicyEvaluationOrchestrator,
    cache: Arc<dyn PolicyEvaluationCache>,
}

impl CachingPolicyEvaluator {
    pub fn new(inner: PolicyEvaluationOrchestrator, cache: Arc<dyn PolicyEvaluationCache>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &PolicyEvaluationOrchestrator {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<dyn PolicyEvaluationCache> {
        &self.cache
    }
}

impl PolicyEvaluator for CachingPolicyEvaluator {
    fn evaluate(&self, zone: &ZoneId, request: &PolicyEvaluationRequest) -> Result<PolicyEvaluationResult> {
        let key = match DecisionKey::new(zone, request) {
            Ok(key) => key,
            Err(error) => {
                warn!(zone = %zone, %error, "request fingerprint failed; evaluating uncached");
                return self.inner.evaluate(zone, request);
            }
        };

        if let Some(result) = self.cache.get(&key) {
            debug!(zone = %zone, subject = %key.subject, resource = %key.resource, "decision cache hit");
            return Ok(result);
        }

        let started = self.cache.begin();
        let trace = self.inner.evaluate_traced(zone, request)?;
        self.cache.set(&key, started, &trace);
        Ok(trace.result)
    }
}
