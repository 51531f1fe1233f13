use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::frame::Frame;
use crate::hierarchy::PartitionKey;
use crate::store::DatasetStore;

/// Identifies one loadable dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Level { country: String, key: PartitionKey },
    GasLevel { country: String, gas: String, key: PartitionKey },
    AllTotals { from_year: i32 },
}

impl CacheKey {
    fn country(&self) -> Option<&str> {
        match self {
            CacheKey::Level { country, .. } | CacheKey::GasLevel { country, .. } => Some(country),
            CacheKey::AllTotals { .. } => None,
        }
    }
}

/// Bounded LRU of loaded frames, owned by whoever serves reads.
///
/// Absent datasets are cached too, so a missing level is not looked up on
/// disk again until it is invalidated.
pub struct FrameCache {
    entries: Mutex<LruCache<CacheKey, Option<Arc<Frame>>>>,
}

impl FrameCache {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    // A panic in a loader never runs under the lock, so the map is intact.
    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Option<Arc<Frame>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value for `key`, running `load` on a miss.
    ///
    /// The lock is not held while loading; two concurrent misses may both load
    /// and the later insert wins.
    pub fn get_or_load<F>(&self, key: CacheKey, load: F) -> Option<Arc<Frame>>
    where
        F: FnOnce() -> Option<Frame>,
    {
        if let Some(hit) = self.lock().get(&key) {
            return hit.clone();
        }
        debug!(?key, "cache miss");
        let value = load().map(Arc::new);
        self.lock().put(key, value.clone());
        value
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains(key)
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.lock().pop(key).is_some()
    }

    /// Drops every entry of one country, plus the cross-country totals.
    pub fn invalidate_country(&self, country: &str) -> usize {
        let mut entries = self.lock();
        let stale: Vec<CacheKey> = entries
            .iter()
            .map(|(k, _)| k)
            .filter(|k| k.country().map_or(true, |c| c == country))
            .cloned()
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`DatasetStore`] behind a [`FrameCache`].
pub struct CachedStore {
    store: DatasetStore,
    cache: FrameCache,
}

impl CachedStore {
    pub fn new(store: DatasetStore, capacity: usize) -> Self {
        Self {
            store,
            cache: FrameCache::new(capacity),
        }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn countries(&self) -> Vec<String> {
        self.store.countries()
    }

    pub fn load_level(&self, country: &str, key: PartitionKey) -> Option<Arc<Frame>> {
        let cache_key = CacheKey::Level {
            country: country.to_owned(),
            key,
        };
        self.cache
            .get_or_load(cache_key, || self.store.load_level(country, key))
    }

    pub fn load_gas_level(&self, country: &str, gas: &str, key: PartitionKey) -> Option<Arc<Frame>> {
        let cache_key = CacheKey::GasLevel {
            country: country.to_owned(),
            gas: gas.to_owned(),
            key,
        };
        self.cache
            .get_or_load(cache_key, || self.store.load_gas_level(country, gas, key))
    }

    pub fn load_all_totals(&self, from_year: i32) -> Option<Arc<Frame>> {
        self.cache.get_or_load(CacheKey::AllTotals { from_year }, || {
            self.store.load_all_totals(from_year)
        })
    }

    /// Forgets a country after its artifacts were rewritten.
    pub fn invalidate_country(&self, country: &str) -> usize {
        self.cache.invalidate_country(country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, ColumnData};
    use crate::hierarchy::Level;
    use std::cell::Cell;

    fn frame(v: i32) -> Frame {
        Frame::new(vec![Column::new("Year", ColumnData::Int32(vec![Some(v)]))]).unwrap()
    }

    fn level(country: &str) -> CacheKey {
        CacheKey::Level {
            country: country.into(),
            key: PartitionKey::Level(Level::Total),
        }
    }

    #[test]
    fn loads_once_per_key() {
        let cache = FrameCache::new(4);
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Some(frame(1990))
        };
        let a = cache.get_or_load(level("germany"), load).unwrap();
        let b = cache.get_or_load(level("germany"), load).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn absent_results_are_cached() {
        let cache = FrameCache::new(4);
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            None
        };
        assert!(cache.get_or_load(level("germany"), load).is_none());
        assert!(cache.get_or_load(level("germany"), load).is_none());
        assert_eq!(calls.get(), 1);
        assert!(cache.invalidate(&level("germany")));
        assert!(cache.get_or_load(level("germany"), load).is_none());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = FrameCache::new(2);
        cache.get_or_load(level("a"), || Some(frame(1)));
        cache.get_or_load(level("b"), || Some(frame(2)));
        cache.get_or_load(level("a"), || None);
        cache.get_or_load(level("c"), || Some(frame(3)));

        assert!(cache.contains(&level("a")));
        assert!(!cache.contains(&level("b")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn country_invalidation_keeps_other_countries() {
        let cache = FrameCache::new(8);
        cache.get_or_load(level("austria"), || Some(frame(1)));
        cache.get_or_load(level("germany"), || Some(frame(2)));
        cache.get_or_load(
            CacheKey::GasLevel {
                country: "germany".into(),
                gas: "co2".into(),
                key: PartitionKey::Memo,
            },
            || None,
        );
        cache.get_or_load(CacheKey::AllTotals { from_year: 1990 }, || None);

        assert_eq!(cache.invalidate_country("germany"), 3);
        assert!(cache.contains(&level("austria")));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_still_caches_one() {
        let cache = FrameCache::new(0);
        cache.get_or_load(level("a"), || Some(frame(1)));
        assert_eq!(cache.len(), 1);
    }
}
