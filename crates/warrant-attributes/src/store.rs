//! Privilege store: entity attributes with scope-gated inheritance.
//!
//! Entities (subjects and resources) carry their own attributes and a list
//! of parents. A resolved entity holds its own attributes plus those of
//! every ancestor reachable through parent edges that are open for the
//! request:
//!
//! - an edge without a scope is always followed
//! - an edge with a scope is followed only when the request's scopes contain
//!   that exact attribute
//!
//! Traversal is transitive, visits each ancestor once, and stops at
//! [`MAX_INHERITANCE_DEPTH`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;
use warrant_types::{Attribute, AttributeSet, EntityKind, ZoneId};

use crate::error::StoreError;

/// Maximum number of parent hops followed during inheritance.
pub const MAX_INHERITANCE_DEPTH: usize = 16;

// ============================================================================
// Entities
// ============================================================================

/// An edge from an entity to one of its parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub identifier: String,
    /// Attribute the request must supply for this edge to be followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Attribute>,
}

impl Parent {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            scope: None,
        }
    }

    pub fn scoped(identifier: impl Into<String>, scope: Attribute) -> Self {
        Self {
            identifier: identifier.into(),
            scope: Some(scope),
        }
    }

    fn is_open(&self, scopes: Option<&AttributeSet>) -> bool {
        match &self.scope {
            None => true,
            Some(required) => scopes.is_some_and(|s| s.has_attribute(required)),
        }
    }
}

/// A stored subject or resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    #[serde(alias = "subjectIdentifier", alias = "resourceIdentifier")]
    pub identifier: String,
    #[serde(default)]
    pub attributes: AttributeSet,
    #[serde(default)]
    pub parents: Vec<Parent>,
}

impl EntityRecord {
    pub fn new(identifier: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            identifier: identifier.into(),
            attributes,
            parents: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: Parent) -> Self {
        self.parents.push(parent);
        self
    }
}

/// An entity with inherited attributes folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub identifier: String,
    /// Own attributes plus every inherited attribute.
    pub attributes: AttributeSet,
    /// The entity's direct parents.
    pub parents: Vec<Parent>,
}

// ============================================================================
// Store Trait
// ============================================================================

/// Storage for subjects and resources, partitioned by zone and kind.
pub trait PrivilegeStore: Send + Sync {
    /// Resolves an entity and the attributes it inherits under `scopes`.
    ///
    /// Returns `Ok(None)` for unknown entities.
    fn entity_with_inherited_attributes(
        &self,
        zone: &ZoneId,
        kind: EntityKind,
        identifier: &str,
        scopes: Option<&AttributeSet>,
    ) -> Result<Option<ResolvedEntity>, StoreError>;

    /// Inserts or replaces an entity.
    fn upsert(&self, zone: &ZoneId, kind: EntityKind, entity: EntityRecord) -> Result<(), StoreError>;

    /// Removes an entity, returning whether it existed.
    fn remove(&self, zone: &ZoneId, kind: EntityKind, identifier: &str) -> Result<bool, StoreError>;

    /// Removes every entity of a zone.
    fn remove_zone(&self, zone: &ZoneId) -> Result<(), StoreError>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

type Partition = HashMap<String, EntityRecord>;

/// Parent-pointer store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPrivilegeStore {
    partitions: RwLock<HashMap<(ZoneId, EntityKind), Partition>>,
}

impl InMemoryPrivilegeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrivilegeStore for InMemoryPrivilegeStore {
    fn entity_with_inherited_attributes(
        &self,
        zone: &ZoneId,
        kind: EntityKind,
        identifier: &str,
        scopes: Option<&AttributeSet>,
    ) -> Result<Option<ResolvedEntity>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| StoreError::LockPoisoned)?;
        let Some(partition) = partitions.get(&(zone.clone(), kind)) else {
            return Ok(None);
        };
        Ok(resolve(partition, identifier, scopes))
    }

    fn upsert(&self, zone: &ZoneId, kind: EntityKind, entity: EntityRecord) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| StoreError::LockPoisoned)?;
        partitions
            .entry((zone.clone(), kind))
            .or_default()
            .insert(entity.identifier.clone(), entity);
        Ok(())
    }

    fn remove(&self, zone: &ZoneId, kind: EntityKind, identifier: &str) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(partitions
            .get_mut(&(zone.clone(), kind))
            .and_then(|p| p.remove(identifier))
            .is_some())
    }

    fn remove_zone(&self, zone: &ZoneId) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| StoreError::LockPoisoned)?;
        partitions.retain(|(z, _), _| z != zone);
        Ok(())
    }
}

/// Breadth-first walk over open parent edges.
fn resolve(partition: &Partition, identifier: &str, scopes: Option<&AttributeSet>) -> Option<ResolvedEntity> {
    let root = partition.get(identifier)?;
    let mut attributes = root.attributes.clone();
    let mut visited: HashSet<&str> = HashSet::from([identifier]);
    let mut frontier: VecDeque<(&Parent, usize)> = root
        .parents
        .iter()
        .filter(|p| p.is_open(scopes))
        .map(|p| (p, 1))
        .collect();

    while let Some((edge, depth)) = frontier.pop_front() {
        if !visited.insert(edge.identifier.as_str()) {
            continue;
        }
        let Some(parent) = partition.get(&edge.identifier) else {
            debug!(identifier, parent = %edge.identifier, "parent not found");
            continue;
        };
        attributes.merge(&parent.attributes);
        if depth < MAX_INHERITANCE_DEPTH {
            frontier.extend(
                parent
                    .parents
                    .iter()
                    .filter(|p| p.is_open(scopes))
                    .map(|p| (p, depth + 1)),
            );
        }
    }

    Some(ResolvedEntity {
        identifier: root.identifier.clone(),
        attributes,
        parents: root.parents.clone(),
    })
}

// ============================================================================
// Tests
// ============================================================================
