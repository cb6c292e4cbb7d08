//! Compiled-condition caches keyed by source text.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::CompiledCondition;

/// Storage for compiled conditions, keyed by the exact source text.
pub trait ConditionCache: Send + Sync {
    fn get(&self, source: &str) -> Option<Arc<CompiledCondition>>;

    fn put(&self, source: &str, condition: Arc<CompiledCondition>);

    fn remove(&self, source: &str);
}

/// Process-local condition cache.
#[derive(Debug, Default)]
pub struct InMemoryConditionCache {
    entries: RwLock<HashMap<String, Arc<CompiledCondition>>>,
}

impl InMemoryConditionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// A poisoned lock still guards a consistent map: every write is a single
// insert or remove.
impl ConditionCache for InMemoryConditionCache {
    fn get(&self, source: &str) -> Option<Arc<CompiledCondition>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(source)
            .cloned()
    }

    fn put(&self, source: &str, condition: Arc<CompiledCondition>) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(source.to_string(), condition);
    }

    fn remove(&self, source: &str) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(source);
    }
}

/// Cache that never stores anything, so every lookup re-parses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpConditionCache;

impl ConditionCache for NoOpConditionCache {
    fn get(&self, _source: &str) -> Option<Arc<CompiledCondition>> {
        None
    }

    fn put(&self, _source: &str, _condition: Arc<CompiledCondition>) {}

    fn remove(&self, _source: &str) {}
}
