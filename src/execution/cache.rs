//! # Plan Cache (C8)
//!
//! Two independent bounded caches — one for optimized [`LogicalPlan`]s,
//! one for costed [`PhysicalPlan`]s — keyed by a SHA-256 digest of the
//! canonical request. Logical and physical plans are cached separately
//! because a shard topology change invalidates physical plans (shard
//! ids/costs) without necessarily invalidating the logical rewrite.
//!
//! Eviction is combined LRU + TTL: a lookup past its TTL is treated as
//! a miss and dropped, and the cache evicts its least-recently-used
//! entry whenever insertion would exceed capacity.

use crate::ast::{Query, SearchRequest};
use crate::plan::logical::LogicalPlan;
use crate::plan::physical::PhysicalPlan;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Canonical cache key (§4.8): SHA-256 over
/// `{index, normalized_query, sorted_aggs, sort, size, from, shard_ids}`.
///
/// `shard_ids` is folded in explicitly because a reshard/rebalance
/// changes which shards a request fans out to without changing the
/// request body at all — without it, a topology change would keep
/// serving a plan built for the old shard list. `aggs` is already
/// canonical for free: it's a `BTreeMap`, and `serde_json` serializes
/// map keys in iteration (i.e. sorted) order. `query` needs an explicit
/// normalization pass first: `Bool`'s `must`/`should`/`must_not`/
/// `filter` clause lists are unordered sets semantically (AND/OR are
/// commutative) but arrive in request order, so two structurally
/// identical bool queries with differently-ordered clauses would
/// otherwise hash to different keys and never share a cache entry.
pub fn cache_key(index: &str, shard_ids: &[u32], request: &SearchRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.as_bytes());
    hasher.update([0u8]);

    let mut sorted_shards = shard_ids.to_vec();
    sorted_shards.sort_unstable();
    for shard_id in &sorted_shards {
        hasher.update(shard_id.to_le_bytes());
    }
    hasher.update([0u8]);

    let mut canonical = request.clone();
    canonical.query = canonicalize_query(&request.query);
    if let Ok(bytes) = serde_json::to_vec(&canonical) {
        hasher.update(&bytes);
    }
    format!("{:x}", hasher.finalize())
}

/// Recursively sorts every `Bool` clause list by its own canonical JSON
/// representation so clause order stops being cache-key-significant at
/// any nesting depth.
fn canonicalize_query(query: &Query) -> Query {
    match query {
        Query::Bool {
            must,
            should,
            must_not,
            filter,
            minimum_should_match,
        } => Query::Bool {
            must: canonicalize_clause_list(must),
            should: canonicalize_clause_list(should),
            must_not: canonicalize_clause_list(must_not),
            filter: canonicalize_clause_list(filter),
            minimum_should_match: minimum_should_match.clone(),
        },
        other => other.clone(),
    }
}

fn canonicalize_clause_list(clauses: &[Query]) -> Vec<Query> {
    let mut canonical: Vec<Query> = clauses.iter().map(canonicalize_query).collect();
    canonical.sort_by_cached_key(|q| serde_json::to_string(q).unwrap_or_default());
    canonical
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: Instant,
}

/// Hit/miss/eviction counters surfaced through [`crate::telemetry`].
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
        )
    }
}

/// A bounded, TTL-aware LRU cache. Not thread-safe on its own; callers
/// wrap it in a lock (see [`PlanCache`]).
struct LruTtlCache<V> {
    entries: HashMap<String, Entry<V>>,
    capacity: usize,
    ttl: Duration,
    stats: CacheStats,
}

impl<V: Clone> LruTtlCache<V> {
    fn new(capacity: usize, ttl: Duration) -> Self {
        LruTtlCache {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            stats: CacheStats::default(),
        }
    }

    fn get(&mut self, key: &str) -> Option<V> {
        let now = Instant::now();
        let expired = self
            .entries
            .get(key)
            .is_some_and(|e| now.duration_since(e.inserted_at) > self.ttl);
        if expired {
            self.entries.remove(key);
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = now;
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put(&mut self, key: String, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(victim) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&victim);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        let now = Instant::now();
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    fn invalidate_prefix(&mut self, prefix_predicate: impl Fn(&str) -> bool) {
        self.entries.retain(|k, _| !prefix_predicate(k));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Combined logical + physical plan cache. Both halves share the same
/// capacity/TTL configuration but are invalidated and sized
/// independently since physical plans turn over more often (shard
/// topology changes) than logical rewrites.
pub struct PlanCache {
    logical: parking_lot::Mutex<LruTtlCache<LogicalPlan>>,
    physical: parking_lot::Mutex<LruTtlCache<(PhysicalPlan, usize)>>,
    /// Tracks which cache keys belong to which index, so `invalidate`
    /// can drop exactly the entries for a reindexed/deleted index
    /// without scanning the whole cache by content.
    index_keys: parking_lot::Mutex<HashMap<String, Vec<String>>>,
}

impl PlanCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        PlanCache {
            logical: parking_lot::Mutex::new(LruTtlCache::new(capacity, ttl)),
            physical: parking_lot::Mutex::new(LruTtlCache::new(capacity, ttl)),
            index_keys: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn remember_key(&self, index: &str, key: &str) {
        self.index_keys
            .lock()
            .entry(index.to_string())
            .or_default()
            .push(key.to_string());
    }

    pub fn get_logical(&self, key: &str) -> Option<LogicalPlan> {
        self.logical.lock().get(key)
    }

    pub fn put_logical(&self, index: &str, key: &str, plan: LogicalPlan) {
        self.logical.lock().put(key.to_string(), plan);
        self.remember_key(index, key);
    }

    pub fn get_physical(&self, key: &str) -> Option<(PhysicalPlan, usize)> {
        self.physical.lock().get(key)
    }

    pub fn put_physical(&self, index: &str, key: &str, plan: PhysicalPlan, passes: usize) {
        self.physical.lock().put(key.to_string(), (plan, passes));
        self.remember_key(index, key);
    }

    /// Drops every cached plan (logical and physical) associated with
    /// `index`. Called on mapping changes / index deletion so a stale
    /// plan referencing a shard count that no longer exists can never
    /// be served.
    pub fn invalidate(&self, index: &str) {
        let Some(keys) = self.index_keys.lock().remove(index) else {
            return;
        };
        let key_set: std::collections::HashSet<&str> = keys.iter().map(String::as_str).collect();
        self.logical
            .lock()
            .invalidate_prefix(|k| key_set.contains(k));
        self.physical
            .lock()
            .invalidate_prefix(|k| key_set.contains(k));
    }

    pub fn logical_stats(&self) -> (u64, u64, u64) {
        self.logical.lock().stats.snapshot()
    }

    pub fn physical_stats(&self) -> (u64, u64, u64) {
        self.physical.lock().stats.snapshot()
    }

    pub fn len(&self) -> (usize, usize) {
        (self.logical.lock().len(), self.physical.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SearchRequest;
    use crate::plan::logical::BASE_CARDINALITY;

    fn sample_plan() -> LogicalPlan {
        LogicalPlan::Scan {
            index: "logs".into(),
            shard_ids: vec![0],
            filter_expr: None,
            estimated_cardinality: BASE_CARDINALITY,
        }
    }

    #[test]
    fn cache_key_is_stable_for_identical_requests() {
        let req = SearchRequest::match_all_default();
        assert_eq!(cache_key("logs", &[0, 1], &req), cache_key("logs", &[0, 1], &req));
    }

    #[test]
    fn cache_key_differs_by_index() {
        let req = SearchRequest::match_all_default();
        assert_ne!(cache_key("logs", &[0], &req), cache_key("metrics", &[0], &req));
    }

    #[test]
    fn cache_key_differs_when_shard_topology_changes() {
        let req = SearchRequest::match_all_default();
        assert_ne!(cache_key("logs", &[0, 1], &req), cache_key("logs", &[0, 1, 2], &req));
    }

    #[test]
    fn cache_key_is_insensitive_to_shard_id_order() {
        let req = SearchRequest::match_all_default();
        assert_eq!(cache_key("logs", &[1, 0, 2], &req), cache_key("logs", &[0, 1, 2], &req));
    }

    #[test]
    fn cache_key_is_insensitive_to_bool_clause_order() {
        use crate::ast::{MinimumShouldMatch, Query};
        let forward = SearchRequest {
            query: Query::Bool {
                must: vec![
                    Query::Term { field: "a".into(), value: "1".into() },
                    Query::Term { field: "b".into(), value: "2".into() },
                ],
                should: vec![],
                must_not: vec![],
                filter: vec![],
                minimum_should_match: MinimumShouldMatch::default(),
            },
            ..SearchRequest::match_all_default()
        };
        let reversed = SearchRequest {
            query: Query::Bool {
                must: vec![
                    Query::Term { field: "b".into(), value: "2".into() },
                    Query::Term { field: "a".into(), value: "1".into() },
                ],
                should: vec![],
                must_not: vec![],
                filter: vec![],
                minimum_should_match: MinimumShouldMatch::default(),
            },
            ..SearchRequest::match_all_default()
        };
        assert_eq!(cache_key("logs", &[0], &forward), cache_key("logs", &[0], &reversed));
    }

    #[test]
    fn put_then_get_is_a_hit() {
        let cache = PlanCache::new(10, Duration::from_secs(60));
        cache.put_logical("logs", "key1", sample_plan());
        assert!(cache.get_logical("key1").is_some());
        let (hits, misses, _) = cache.logical_stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 0);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = PlanCache::new(10, Duration::from_millis(1));
        cache.put_logical("logs", "key1", sample_plan());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_logical("key1").is_none());
    }

    #[test]
    fn capacity_overflow_evicts_least_recently_used() {
        let cache = PlanCache::new(2, Duration::from_secs(60));
        cache.put_logical("logs", "a", sample_plan());
        cache.put_logical("logs", "b", sample_plan());
        cache.get_logical("a"); // touch a, making b the LRU entry
        cache.put_logical("logs", "c", sample_plan());
        assert!(cache.get_logical("a").is_some());
        assert!(cache.get_logical("b").is_none());
    }

    #[test]
    fn invalidate_drops_only_that_indexs_entries() {
        let cache = PlanCache::new(10, Duration::from_secs(60));
        cache.put_logical("logs", "logs-key", sample_plan());
        cache.put_logical("metrics", "metrics-key", sample_plan());
        cache.invalidate("logs");
        assert!(cache.get_logical("logs-key").is_none());
        assert!(cache.get_logical("metrics-key").is_some());
    }
}
