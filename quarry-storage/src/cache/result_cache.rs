//! In-process TTL cache of successful execution outcomes.

use super::key::ResultCacheKey;
use super::stats::CacheStats;
use quarry_core::ExecutionOutcome;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    outcome: ExecutionOutcome,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<ResultCacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// TTL cache of [`ExecutionOutcome::Success`] values.
///
/// Every mutation goes through one lock. Expired entries are dropped lazily
/// on read and in bulk by [`ResultCache::sweep`]. When `max_entries` is
/// reached the oldest entry is evicted to make room.
#[derive(Debug)]
pub struct ResultCache {
    state: RwLock<CacheState>,
    default_ttl: Duration,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a key. Expired entries count as a miss and are removed.
    pub fn get(&self, key: &ResultCacheKey) -> Option<ExecutionOutcome> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &ResultCacheKey, now: Instant) -> Option<ExecutionOutcome> {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(key = %key, "result cache lock poisoned, treating as miss");
                return None;
            }
        };

        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            state.entries.remove(key);
            state.expirations += 1;
            state.misses += 1;
            return None;
        }

        state.hits += 1;
        state.entries.get(key).map(|entry| entry.outcome.clone())
    }

    /// Store an outcome with the default TTL.
    pub fn put(&self, key: ResultCacheKey, outcome: ExecutionOutcome) -> bool {
        self.put_with_ttl(key, outcome, self.default_ttl)
    }

    pub fn put_with_ttl(&self, key: ResultCacheKey, outcome: ExecutionOutcome, ttl: Duration) -> bool {
        self.put_at(key, outcome, ttl, Instant::now())
    }

    /// Store an outcome. Returns `false` without storing when the outcome is
    /// a failure, the TTL is zero, or the lock is poisoned.
    pub fn put_at(
        &self,
        key: ResultCacheKey,
        outcome: ExecutionOutcome,
        ttl: Duration,
        now: Instant,
    ) -> bool {
        if !outcome.is_success() || ttl.is_zero() {
            return false;
        }

        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(key = %key, "result cache lock poisoned, skipping insert");
                return false;
            }
        };

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                state.evictions += 1;
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                outcome,
                inserted_at: now,
                ttl,
            },
        );
        true
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("result cache lock poisoned, skipping sweep");
                return 0;
            }
        };

        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();
        state.expirations += removed as u64;
        removed
    }

    pub fn clear(&self) {
        match self.state.write() {
            Ok(mut state) => state.entries.clear(),
            Err(_) => tracing::warn!("result cache lock poisoned, skipping clear"),
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        match self.state.read() {
            Ok(state) => CacheStats {
                hits: state.hits,
                misses: state.misses,
                entry_count: state.entries.len() as u64,
                evictions: state.evictions,
                expirations: state.expirations,
            },
            Err(_) => CacheStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{
        CallerIdentity, ComplexityScore, ComplexityTier, ErrorKind, QuerySuccess, Role, Row,
    };
    use serde_json::json;

    fn success(n: i64) -> ExecutionOutcome {
        let mut row = Row::new();
        row.insert("count".to_string(), json!(n));
        ExecutionOutcome::Success(QuerySuccess {
            rows: vec![row],
            row_count: 1,
            elapsed_ms: 3,
            complexity_tier: ComplexityTier::Low,
            complexity: ComplexityScore::default(),
            cached: false,
        })
    }

    fn key(sql: &str) -> ResultCacheKey {
        ResultCacheKey::new(sql, &CallerIdentity::new(Role::Admin, "u1"))
    }

    #[test]
    fn test_put_then_get() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        assert!(cache.put(key("SELECT 1"), success(1)));
        assert_eq!(cache.get(&key("SELECT 1")), Some(success(1)));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_failure_is_never_stored() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        let failure = ExecutionOutcome::failure(ErrorKind::SyntaxError, "bad");
        assert!(!cache.put(key("SELECT 1"), failure));
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key("SELECT 1")), None);
    }

    #[test]
    fn test_entry_expires_on_read() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        let start = Instant::now();
        cache.put_at(key("SELECT 1"), success(1), Duration::from_secs(5), start);

        assert!(cache.get_at(&key("SELECT 1"), start + Duration::from_secs(4)).is_some());
        assert!(cache.get_at(&key("SELECT 1"), start + Duration::from_secs(5)).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        let start = Instant::now();
        cache.put_at(key("SELECT 1"), success(1), Duration::from_secs(5), start);
        cache.put_at(key("SELECT 2"), success(2), Duration::from_secs(50), start);

        assert_eq!(cache.sweep_at(start + Duration::from_secs(10)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_at(&key("SELECT 2"), start + Duration::from_secs(10)).is_some());
    }

    #[test]
    fn test_oldest_entry_evicted_at_capacity() {
        let cache = ResultCache::new(Duration::from_secs(60), 2);
        let start = Instant::now();
        cache.put_at(key("SELECT 1"), success(1), Duration::from_secs(60), start);
        cache.put_at(key("SELECT 2"), success(2), Duration::from_secs(60), start + Duration::from_secs(1));
        cache.put_at(key("SELECT 3"), success(3), Duration::from_secs(60), start + Duration::from_secs(2));

        let now = start + Duration::from_secs(3);
        assert!(cache.get_at(&key("SELECT 1"), now).is_none());
        assert!(cache.get_at(&key("SELECT 2"), now).is_some());
        assert!(cache.get_at(&key("SELECT 3"), now).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        cache.put(key("SELECT 1"), success(1));
        cache.get(&key("SELECT 1"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 1);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use quarry_core::{CallerIdentity, ComplexityScore, ComplexityTier, QuerySuccess, Role, Row};

    fn success(value: &str) -> ExecutionOutcome {
        let mut row = Row::new();
        row.insert("v".to_string(), serde_json::Value::String(value.to_string()));
        ExecutionOutcome::Success(QuerySuccess {
            rows: vec![row],
            row_count: 1,
            elapsed_ms: 0,
            complexity_tier: ComplexityTier::Low,
            complexity: ComplexityScore::default(),
            cached: false,
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_roundtrip_until_ttl(
            sql in "SELECT [a-z]{1,8} FROM [a-z]{1,8}",
            value in "[a-z0-9]{0,12}",
            ttl_secs in 1u64..600,
        ) {
            let cache = ResultCache::new(Duration::from_secs(60), 100);
            let identity = CallerIdentity::new(Role::Staff, "u1");
            let k = ResultCacheKey::new(&sql, &identity);
            let start = Instant::now();
            let ttl = Duration::from_secs(ttl_secs);

            cache.put_at(k, success(&value), ttl, start);
            prop_assert_eq!(cache.get_at(&k, start + ttl - Duration::from_millis(1)), Some(success(&value)));
            prop_assert_eq!(cache.get_at(&k, start + ttl), None);
        }

        #[test]
        fn prop_identity_isolation(
            sql in "SELECT [a-z]{1,8} FROM [a-z]{1,8}",
            user_a in "[a-z]{1,6}",
            user_b in "[a-z]{1,6}",
        ) {
            prop_assume!(user_a != user_b);
            let cache = ResultCache::new(Duration::from_secs(60), 100);
            let a = ResultCacheKey::new(&sql, &CallerIdentity::new(Role::Student, user_a));
            let b = ResultCacheKey::new(&sql, &CallerIdentity::new(Role::Student, user_b));

            cache.put(a, success("a"));
            prop_assert!(cache.get(&b).is_none());
            prop_assert!(cache.get(&a).is_some());
        }
    }
}
