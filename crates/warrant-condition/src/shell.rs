//! Compiles conditions through a cache and evaluates policy condition lists.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::cache::{ConditionCache, InMemoryConditionCache, NoOpConditionCache};
use crate::error::Result;
use crate::interpreter::ConditionContext;
use crate::CompiledCondition;

/// Entry point for compiling and running conditions.
///
/// Compilation goes through the injected [`ConditionCache`]. Two callers that
/// miss on the same text at once both compile it; the later `put` wins and
/// both results are equivalent.
#[derive(Clone)]
pub struct ConditionShell {
    cache: Arc<dyn ConditionCache>,
}

impl ConditionShell {
    pub fn new(cache: Arc<dyn ConditionCache>) -> Self {
        Self { cache }
    }

    /// A shell that re-parses every condition.
    pub fn uncached() -> Self {
        Self::new(Arc::new(NoOpConditionCache))
    }

    /// Returns the compiled form of `source`, parsing it on a cache miss.
    pub fn compile(&self, source: &str) -> Result<Arc<CompiledCondition>> {
        if let Some(compiled) = self.cache.get(source) {
            trace!(condition = source, "condition cache hit");
            return Ok(compiled);
        }

        debug!(condition = source, "compiling condition");
        let compiled = Arc::new(CompiledCondition::compile(source)?);
        self.cache.put(source, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Checks that `source` compiles.
    pub fn validate(&self, source: &str) -> Result<()> {
        self.compile(source).map(|_| ())
    }

    /// Compiles and evaluates a single condition.
    pub fn evaluate(&self, source: &str, ctx: &ConditionContext<'_>) -> Result<bool> {
        self.compile(source)?.evaluate(ctx)
    }

    /// Evaluates conditions as a logical AND, stopping at the first `false`.
    ///
    /// An empty list is vacuously `true`.
    pub fn evaluate_all<'s>(
        &self,
        sources: impl IntoIterator<Item = &'s str>,
        ctx: &ConditionContext<'_>,
    ) -> Result<bool> {
        for source in sources {
            if !self.evaluate(source, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drops the cached compilation of `source`.
    pub fn evict(&self, source: &str) {
        self.cache.remove(source);
    }
}

impl Default for ConditionShell {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryConditionCache::new()))
    }
}

impl fmt::Debug for ConditionShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionShell").finish_non_exhaustive()
    }
}
