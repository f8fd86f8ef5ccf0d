//! Per-run memo of store lookups.
//!
//! Entries are keyed by `(EdgeId, key)` and hold a `tokio::sync::OnceCell`.
//! The first caller for an entry runs the lookup; concurrent callers for the
//! same entry wait on the same cell instead of issuing their own query. The
//! map shard lock is only held while the cell is fetched or installed, never
//! across the lookup itself.
//!
//! A failed lookup removes its empty cell, so the next caller tries again and
//! an outage does not leave one dead entry per key behind.
//! Empty results are cached like any other (negative entries).

use chemxref_graph::{EdgeId, KeySet};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Lookups actually computed (store queries issued, retries excluded).
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub struct LookupCache {
    entries: DashMap<(EdgeId, String), Arc<OnceCell<KeySet>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `(edge, key)`, computing it with `compute` if absent.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        edge: EdgeId,
        key: &str,
        compute: F,
    ) -> Result<KeySet, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<KeySet, E>>,
    {
        let cell = self.cell(edge, key);
        if let Some(keys) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(keys.clone());
        }

        let mut computed = false;
        let result = cell
            .get_or_try_init(|| {
                computed = true;
                self.misses.fetch_add(1, Ordering::Relaxed);
                compute()
            })
            .await;
        let keys = match result {
            Ok(keys) => keys,
            Err(err) => {
                self.entries
                    .remove_if(&(edge, key.to_string()), |_, cell| !cell.initialized());
                return Err(err);
            }
        };
        if !computed {
            // another caller finished the lookup while we waited
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(keys.clone())
    }

    /// Cached value without computing anything.
    pub fn peek(&self, edge: EdgeId, key: &str) -> Option<KeySet> {
        self.entries
            .get(&(edge, key.to_string()))
            .and_then(|cell| cell.get().cloned())
    }

    /// Cells currently held, including lookups still in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .entries
                .iter()
                .filter(|entry| entry.value().initialized())
                .count(),
        }
    }

    fn cell(&self, edge: EdgeId, key: &str) -> Arc<OnceCell<KeySet>> {
        // The shard guard drops at the end of this statement.
        self.entries
            .entry((edge, key.to_string()))
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_negative_entries_are_cached() {
        let cache = LookupCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let keys = cache
                .get_or_compute(EdgeId::new(0), "DB99999", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(KeySet::new())
                })
                .await
                .unwrap();
            assert!(!keys.is_found());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 2,
                misses: 1,
                entries: 1
            }
        );
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = LookupCache::new();
        let err = cache
            .get_or_compute(EdgeId::new(1), "x", || async { Err::<KeySet, _>("down") })
            .await;
        assert_eq!(err, Err("down"));
        assert_eq!(cache.peek(EdgeId::new(1), "x"), None);
        assert!(cache.is_empty());

        let ok = cache
            .get_or_compute(EdgeId::new(1), "x", || async {
                Ok::<_, &str>(KeySet::single("y"))
            })
            .await
            .unwrap();
        assert_eq!(ok.as_slice(), &["y"]);
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn test_repeated_failures_leave_no_entries() {
        let cache = LookupCache::new();
        for i in 0..50 {
            let key = format!("DB{i:05}");
            let res = cache
                .get_or_compute(EdgeId::new(0), &key, || async { Err::<KeySet, _>("down") })
                .await;
            assert!(res.is_err());
        }
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 50);
    }

    #[tokio::test]
    async fn test_entries_are_per_edge() {
        let cache = LookupCache::new();
        cache
            .get_or_compute(EdgeId::new(0), "k", || async { Ok::<_, ()>(KeySet::single("a")) })
            .await
            .unwrap();
        let other = cache
            .get_or_compute(EdgeId::new(1), "k", || async { Ok::<_, ()>(KeySet::single("b")) })
            .await
            .unwrap();
        assert_eq!(other.as_slice(), &["b"]);
        assert_eq!(cache.stats().misses, 2);
    }
}
