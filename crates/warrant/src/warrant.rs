//! The `Warrant` decision engine.

use std::sync::Arc;

use tracing::info;
use warrant_abac::{
    CachingPolicyEvaluator, InMemoryPolicyEvaluationCache, InMemoryPolicySetStore,
    NoOpPolicyEvaluationCache, PolicyEvaluationCache, PolicyEvaluationOrchestrator,
    PolicyEvaluationRequest, PolicyEvaluationResult, PolicyEvaluator, PolicySet, PolicySetStore,
    validate_policy_set,
};
use warrant_attributes::{
    AdapterProvider, AttributeReaderFactory, EntityRecord, InMemoryPrivilegeStore, PrivilegeStore,
    StaticAdapterProvider, ZoneConnectors,
};
use warrant_condition::{ConditionCache, ConditionShell, InMemoryConditionCache, NoOpConditionCache};
use warrant_config::WarrantConfig;
use warrant_types::{Clock, EntityKind, SystemClock, ZoneId};

use crate::error::Result;

/// Assembles a [`Warrant`] from configuration and injected backends.
///
/// Every backend defaults to its in-memory implementation.
pub struct WarrantBuilder {
    config: WarrantConfig,
    privileges: Option<Arc<dyn PrivilegeStore>>,
    policy_sets: Option<Arc<dyn PolicySetStore>>,
    adapters: Option<Arc<dyn AdapterProvider>>,
    clock: Option<Arc<dyn Clock>>,
}

impl WarrantBuilder {
    pub fn new(config: WarrantConfig) -> Self {
        Self {
            config,
            privileges: None,
            policy_sets: None,
            adapters: None,
            clock: None,
        }
    }

    pub fn with_privilege_store(mut self, store: Arc<dyn PrivilegeStore>) -> Self {
        self.privileges = Some(store);
        self
    }

    pub fn with_policy_set_store(mut self, store: Arc<dyn PolicySetStore>) -> Self {
        self.policy_sets = Some(store);
        self
    }

    pub fn with_adapter_provider(mut self, adapters: Arc<dyn AdapterProvider>) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Time source for attribute and decision cache expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validates the configuration and wires the engine together.
    pub fn build(self) -> Result<Warrant> {
        let config = self.config;
        config.validate()?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new()),
        };
        let privileges: Arc<dyn PrivilegeStore> = match self.privileges {
            Some(store) => store,
            None => Arc::new(InMemoryPrivilegeStore::new()),
        };
        let policy_sets: Arc<dyn PolicySetStore> = match self.policy_sets {
            Some(store) => store,
            None => Arc::new(InMemoryPolicySetStore::new()),
        };
        let adapters: Arc<dyn AdapterProvider> = match self.adapters {
            Some(adapters) => adapters,
            None => Arc::new(StaticAdapterProvider::new()),
        };

        let readers = Arc::new(AttributeReaderFactory::with_clock(
            Arc::clone(&privileges),
            adapters,
            config.reader_settings(),
            Arc::clone(&clock),
        ));
        for zone in &config.zones {
            readers.set_connectors(
                &ZoneId::new(zone.name.clone()),
                zone.connectors(config.attribute_cache.ttl_minutes),
            );
        }

        let condition_cache: Arc<dyn ConditionCache> = if config.condition_cache.enabled {
            Arc::new(InMemoryConditionCache::new())
        } else {
            Arc::new(NoOpConditionCache)
        };
        let decision_cache: Arc<dyn PolicyEvaluationCache> = if config.decision_cache.enabled {
            Arc::new(InMemoryPolicyEvaluationCache::with_clock(
                config.decision_cache.ttl(),
                clock,
            ))
        } else {
            Arc::new(NoOpPolicyEvaluationCache)
        };

        let orchestrator = PolicyEvaluationOrchestrator::new(
            Arc::clone(&policy_sets),
            Arc::clone(&readers),
            ConditionShell::new(condition_cache),
        );

        info!(
            zones = config.zones.len(),
            decision_cache = config.decision_cache.enabled,
            attribute_cache = config.attribute_cache.enabled,
            "warrant ready"
        );
        Ok(Warrant {
            config,
            privileges,
            policy_sets,
            readers,
            evaluator: CachingPolicyEvaluator::new(orchestrator, decision_cache),
        })
    }
}

/// Multi-tenant attribute-based access control engine.
///
/// Mutations go to the stores first and then invalidate the cached
/// decisions they may affect.
pub struct Warrant {
    config: WarrantConfig,
    privileges: Arc<dyn PrivilegeStore>,
    policy_sets: Arc<dyn PolicySetStore>,
    readers: Arc<AttributeReaderFactory>,
    evaluator: CachingPolicyEvaluator,
}

impl Warrant {
    pub fn builder(config: WarrantConfig) -> WarrantBuilder {
        WarrantBuilder::new(config)
    }

    /// An engine with default configuration and in-memory backends.
    pub fn in_memory() -> Result<Self> {
        WarrantBuilder::new(WarrantConfig::default()).build()
    }

    pub fn config(&self) -> &WarrantConfig {
        &self.config
    }

    pub fn evaluate(&self, zone: &ZoneId, request: &PolicyEvaluationRequest) -> Result<PolicyEvaluationResult> {
        Ok(self.evaluator.evaluate(zone, request)?)
    }

    // ------------------------------------------------------------------------
    // Policy sets
    // ------------------------------------------------------------------------

    /// Validates and stores `set`, replacing a set with the same name.
    pub fn upsert_policy_set(&self, zone: &ZoneId, set: PolicySet) -> Result<()> {
        validate_policy_set(&set, self.evaluator.inner().shell())?;
        let name = set.name.clone();
        let replaced = self.stored_policy_set(zone, &name)?;
        let successor = set.clone();
        self.policy_sets.upsert(zone, set)?;
        self.decisions().reset_for_policy_set(zone, &name);
        if let Some(replaced) = replaced {
            self.evaluator.inner().evict_compiled(&replaced, Some(&successor));
        }
        info!(zone = %zone, policy_set = %name, "policy set stored");
        Ok(())
    }

    pub fn remove_policy_set(&self, zone: &ZoneId, name: &str) -> Result<bool> {
        let retired = self.stored_policy_set(zone, name)?;
        let removed = self.policy_sets.remove(zone, name)?;
        self.decisions().reset_for_policy_set(zone, name);
        if let Some(retired) = retired {
            self.evaluator.inner().evict_compiled(&retired, None);
        }
        if removed {
            info!(zone = %zone, policy_set = %name, "policy set removed");
        }
        Ok(removed)
    }

    fn stored_policy_set(&self, zone: &ZoneId, name: &str) -> Result<Option<Arc<PolicySet>>> {
        Ok(self
            .policy_sets
            .policy_sets(zone)?
            .into_iter()
            .find(|set| set.name == name))
    }

    pub fn policy_sets(&self, zone: &ZoneId) -> Result<Vec<Arc<PolicySet>>> {
        Ok(self.policy_sets.policy_sets(zone)?)
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    pub fn upsert_subject(&self, zone: &ZoneId, subject: EntityRecord) -> Result<()> {
        let identifier = subject.identifier.clone();
        self.privileges.upsert(zone, EntityKind::Subject, subject)?;
        self.decisions().reset_for_subject(zone, &identifier);
        Ok(())
    }

    pub fn upsert_resource(&self, zone: &ZoneId, resource: EntityRecord) -> Result<()> {
        let identifier = resource.identifier.clone();
        self.privileges.upsert(zone, EntityKind::Resource, resource)?;
        self.decisions().reset_for_resource(zone, &identifier);
        Ok(())
    }

    pub fn remove_subject(&self, zone: &ZoneId, identifier: &str) -> Result<bool> {
        let removed = self.privileges.remove(zone, EntityKind::Subject, identifier)?;
        self.decisions().reset_for_subject(zone, identifier);
        Ok(removed)
    }

    pub fn remove_resource(&self, zone: &ZoneId, identifier: &str) -> Result<bool> {
        let removed = self.privileges.remove(zone, EntityKind::Resource, identifier)?;
        self.decisions().reset_for_resource(zone, identifier);
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Zones
    // ------------------------------------------------------------------------

    /// Replaces the zone's attribute connectors.
    pub fn set_connectors(&self, zone: &ZoneId, connectors: ZoneConnectors) {
        self.readers.set_connectors(zone, connectors);
        self.decisions().reset_for_zone(zone);
    }

    pub fn connectors(&self, zone: &ZoneId) -> ZoneConnectors {
        self.readers.connectors(zone)
    }

    /// Deletes every policy set, entity, connector and cached decision of the zone.
    pub fn remove_zone(&self, zone: &ZoneId) -> Result<()> {
        let retired = self.policy_sets.policy_sets(zone)?;
        self.policy_sets.remove_zone(zone)?;
        for set in &retired {
            self.evaluator.inner().evict_compiled(set, None);
        }
        self.privileges.remove_zone(zone)?;
        self.readers.remove_zone(zone);
        self.decisions().reset_for_zone(zone);
        info!(zone = %zone, "zone removed");
        Ok(())
    }

    /// Drops every cached decision.
    pub fn flush_decisions(&self) {
        self.decisions().flush_all();
    }

    fn decisions(&self) -> &dyn PolicyEvaluationCache {
        self.evaluator.cache().as_ref()
    }
}
