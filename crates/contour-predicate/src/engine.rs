//! Pattern matching against messages
//!
//! `PredicateEngine` compiles conjunct strings with the path language of the
//! message type and memoizes the result, so repeated routing of the same
//! directory entries does not recompile them. Conjuncts come from every
//! node's registrations, so the cache is bounded and drops the least
//! recently used query once full. Matching is side-effect free apart from
//! that cache.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use contour_core::Pattern;

use crate::error::PredicateError;
use crate::message::Message;

/// Compiled queries kept by a default engine
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 1024;

/// A pattern whose conjuncts all compiled for message type `M`
pub struct CompiledPattern<M: Message> {
    pattern: Pattern,
    queries: Vec<Arc<M::Query>>,
}

impl<M: Message> Clone for CompiledPattern<M> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            queries: self.queries.clone(),
        }
    }
}

impl<M: Message> fmt::Debug for CompiledPattern<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("kind", &M::KIND)
            .field("pattern", &self.pattern)
            .field("queries", &self.queries)
            .finish()
    }
}

impl<M: Message> CompiledPattern<M> {
    /// Source pattern
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Compiled conjuncts in pattern order
    pub fn queries(&self) -> &[Arc<M::Query>] {
        &self.queries
    }

    /// Whether every conjunct holds on `message`
    pub fn matches(&self, message: &M) -> bool {
        match message.satisfies_all(&self.queries) {
            Ok(matched) => matched,
            Err(err) => {
                tracing::warn!(pattern = %self.pattern, error = %err, "Message could not be evaluated");
                false
            }
        }
    }
}

type CacheKey = (&'static str, String);

struct CacheEntry {
    query: Arc<dyn Any + Send + Sync>,
    last_used: u64,
}

struct QueryCache {
    entries: HashMap<CacheKey, CacheEntry>,
    capacity: usize,
    clock: u64,
}

impl QueryCache {
    fn get(&mut self, key: &CacheKey) -> Option<Arc<dyn Any + Send + Sync>> {
        self.clock += 1;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = self.clock;
        Some(Arc::clone(&entry.query))
    }

    fn insert(&mut self, key: CacheKey, query: Arc<dyn Any + Send + Sync>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.clock += 1;
        self.entries.insert(
            key,
            CacheEntry {
                query,
                last_used: self.clock,
            },
        );
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Shared, thread-safe conjunct compiler and matcher
#[derive(Clone)]
pub struct PredicateEngine {
    cache: Arc<Mutex<QueryCache>>,
}

impl Default for PredicateEngine {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUERY_CACHE_CAPACITY)
    }
}

impl fmt::Debug for PredicateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("PredicateEngine")
            .field("cached_queries", &cache.entries.len())
            .field("capacity", &cache.capacity)
            .finish()
    }
}

impl PredicateEngine {
    /// Create an engine with an empty query cache of the default size
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine keeping at most `capacity` compiled queries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(QueryCache {
                entries: HashMap::new(),
                capacity: capacity.max(1),
                clock: 0,
            })),
        }
    }

    /// Compile one conjunct for `M`, reusing a cached compilation when
    /// available
    pub fn query<M: Message>(&self, conjunct: &str) -> Result<Arc<M::Query>, PredicateError> {
        let key: CacheKey = (M::KIND, conjunct.to_string());
        if let Some(hit) = self.cache.lock().get(&key) {
            if let Ok(query) = hit.downcast::<M::Query>() {
                return Ok(query);
            }
        }
        let compiled = Arc::new(M::compile_query(conjunct)?);
        let shared: Arc<dyn Any + Send + Sync> = compiled.clone();
        self.cache.lock().insert(key, shared);
        Ok(compiled)
    }

    /// Compile every conjunct of `pattern` for `M`
    pub fn compile<M: Message>(&self, pattern: &Pattern) -> Result<CompiledPattern<M>, PredicateError> {
        let queries = pattern
            .conjuncts()
            .iter()
            .map(|conjunct| self.query::<M>(conjunct))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledPattern {
            pattern: pattern.clone(),
            queries,
        })
    }

    /// Check that every conjunct of `pattern` compiles for `M`
    pub fn validate<M: Message>(&self, pattern: &Pattern) -> Result<(), PredicateError> {
        self.compile::<M>(pattern).map(|_| ())
    }

    /// Whether `pattern` matches `message`.
    ///
    /// A conjunct that does not compile makes the pattern not match.
    pub fn matches<M: Message>(&self, pattern: &Pattern, message: &M) -> bool {
        match self.compile::<M>(pattern) {
            Ok(compiled) => compiled.matches(message),
            Err(err) => {
                tracing::warn!(%pattern, error = %err, "Skipping pattern that does not compile");
                false
            }
        }
    }

    /// Number of compiled queries currently cached
    pub fn cached_queries(&self) -> usize {
        self.cache.lock().entries.len()
    }
}
