//! Primary-key cache of entities and confirmed-absent markers.

use entity_store_core::{Entity, PrimaryKey};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hit and miss counters of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache (tombstones included).
    pub hits: u64,
    /// Lookups that fell through.
    pub misses: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of an entity cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityLookup<E> {
    /// Cached entity.
    Hit(E),
    /// The key is known to be absent from the backing store.
    Tombstone,
    /// Nothing is known about the key.
    Miss,
}

enum Slot<E> {
    Present(E),
    Absent,
}

/// Bounded LRU cache of entities keyed by primary key.
pub struct EntityCache<E: Entity> {
    enabled: bool,
    entries: Mutex<LruCache<PrimaryKey, Slot<E>>>,
    counters: Counters,
}

impl<E: Entity> EntityCache<E> {
    /// Create an enabled cache holding at most `capacity` keys.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            enabled: true,
            entries: Mutex::new(LruCache::new(capacity)),
            counters: Counters::default(),
        }
    }

    /// Create a cache on which every lookup misses.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            entries: Mutex::new(LruCache::new(NonZeroUsize::MIN)),
            counters: Counters::default(),
        }
    }

    /// Returns true unless built with [`EntityCache::disabled`].
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a key.
    pub fn get(&self, key: &PrimaryKey) -> EntityLookup<E> {
        let lookup = if self.enabled {
            self.entries
                .lock()
                .ok()
                .and_then(|mut entries| {
                    entries.get(key).map(|slot| match slot {
                        Slot::Present(entity) => EntityLookup::Hit(entity.clone()),
                        Slot::Absent => EntityLookup::Tombstone,
                    })
                })
                .unwrap_or(EntityLookup::Miss)
        } else {
            EntityLookup::Miss
        };

        if matches!(lookup, EntityLookup::Miss) {
            self.counters.miss();
        } else {
            self.counters.hit();
        }
        lookup
    }

    /// Cache an entity under `key`.
    pub fn put(&self, key: PrimaryKey, entity: E) {
        self.store(key, Slot::Present(entity));
    }

    /// Record that `key` does not exist.
    pub fn put_tombstone(&self, key: PrimaryKey) {
        self.store(key, Slot::Absent);
    }

    fn store(&self, key: PrimaryKey, slot: Slot<E>) {
        if !self.enabled {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, slot);
        }
    }

    /// Forget a key.
    pub fn remove(&self, key: &PrimaryKey) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(key);
        }
    }

    /// Forget every key.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Number of cached keys, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit and miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}
