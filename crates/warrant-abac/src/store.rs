//! Policy-set storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use warrant_attributes::StoreError;
use warrant_types::ZoneId;

use crate::policy::PolicySet;

/// Per-zone storage of policy sets.
///
/// Stores hold already validated sets and keep them in insertion order.
pub trait PolicySetStore: Send + Sync {
    fn policy_sets(&self, zone: &ZoneId) -> Result<Vec<Arc<PolicySet>>, StoreError>;

    /// Inserts `set`, replacing a set with the same name in place.
    fn upsert(&self, zone: &ZoneId, set: PolicySet) -> Result<(), StoreError>;

    /// Returns whether a set was removed.
    fn remove(&self, zone: &ZoneId, name: &str) -> Result<bool, StoreError>;

    fn remove_zone(&self, zone: &ZoneId) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPolicySetStore {
    zones: RwLock<HashMap<ZoneId, Vec<Arc<PolicySet>>>>,
}

impl InMemoryPolicySetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PolicySetStore for InMemoryPolicySetStore {
    fn policy_sets(&self, zone: &ZoneId) -> Result<Vec<Arc<PolicySet>>, StoreError> {
        let zones = self.zones.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(zones.get(zone).cloned().unwrap_or_default())
    }

    fn upsert(&self, zone: &ZoneId, set: PolicySet) -> Result<(), StoreError> {
        let mut zones = self.zones.write().map_err(|_| StoreError::LockPoisoned)?;
        let sets = zones.entry(zone.clone()).or_default();
        match sets.iter_mut().find(|existing| existing.name == set.name) {
            Some(existing) => *existing = Arc::new(set),
            None => sets.push(Arc::new(set)),
        }
        Ok(())
    }

    fn remove(&self, zone: &ZoneId, name: &str) -> Result<bool, StoreError> {
        let mut zones = self.zones.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(sets) = zones.get_mut(zone) else {
            return Ok(false);
        };
        let before = sets.len();
        sets.retain(|set| set.name != name);
        let removed = sets.len() != before;
        if sets.is_empty() {
            zones.remove(zone);
        }
        Ok(removed)
    }

    fn remove_zone(&self, zone: &ZoneId) -> Result<(), StoreError> {
        self.zones
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(zone);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Effect, Policy};

    fn names(store: &InMemoryPolicySetStore, zone: &ZoneId) -> Vec<String> {
        store
            .policy_sets(zone)
            .unwrap()
            .iter()
            .map(|set| set.name.clone())
            .collect()
    }

    #[test]
    fn upsert_keeps_insertion_order_and_replaces_in_place() {
        let store = InMemoryPolicySetStore::new();
        let zone = ZoneId::from("z");
        store.upsert(&zone, PolicySet::permit_all("a")).unwrap();
        store.upsert(&zone, PolicySet::permit_all("b")).unwrap();
        store
            .upsert(&zone, PolicySet::new("a").with_policy(Policy::new("deny", Effect::Deny)))
            .unwrap();

        assert_eq!(names(&store, &zone), vec!["a", "b"]);
        assert_eq!(store.policy_sets(&zone).unwrap()[0].policies[0].effect, Effect::Deny);
    }

    #[test]
    fn zones_are_isolated() {
        let store = InMemoryPolicySetStore::new();
        store.upsert(&ZoneId::from("z1"), PolicySet::permit_all("a")).unwrap();
        assert!(store.policy_sets(&ZoneId::from("z2")).unwrap().is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let store = InMemoryPolicySetStore::new();
        let zone = ZoneId::from("z");
        store.upsert(&zone, PolicySet::permit_all("a")).unwrap();

        assert!(store.remove(&zone, "a").unwrap());
        assert!(!store.remove(&zone, "a").unwrap());
        assert!(names(&store, &zone).is_empty());

        store.upsert(&zone, PolicySet::permit_all("b")).unwrap();
        store.remove_zone(&zone).unwrap();
        assert!(names(&store, &zone).is_empty());
    }
}
