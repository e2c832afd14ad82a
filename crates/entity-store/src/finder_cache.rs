//! Query-result cache keyed by finder path and arguments.

use crate::entity_cache::{CacheStats, Counters};
use crate::finder_path::{CacheNamespace, FinderPath};
use entity_store_core::{OrderByComparator, PrimaryKey, Value, Window};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

/// Cached outcome of one finder query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedResult {
    /// A unique finder matched this entity.
    Entity(PrimaryKey),
    /// A unique finder matched nothing.
    Empty,
    /// A list finder matched these entities, in result order.
    List(Arc<[PrimaryKey]>),
    /// A count query result.
    Count(u64),
}

/// Arguments plus, for paginated paths, the window and ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FinderKey {
    args: Vec<Value>,
    window: Window,
    order: Option<OrderByComparator>,
}

impl FinderKey {
    /// Key of an unpaginated lookup.
    #[must_use]
    pub const fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            window: Window::All,
            order: None,
        }
    }

    /// Key of a paginated lookup.
    #[must_use]
    pub const fn paginated(args: Vec<Value>, window: Window, order: Option<OrderByComparator>) -> Self {
        Self {
            args,
            window,
            order,
        }
    }

    /// Finder arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Change notification emitted by a [`FinderCache`].
#[derive(Debug, Clone, Copy)]
pub enum CacheEvent<'a> {
    /// A result was stored without the quiet flag.
    Put {
        /// Path of the entry.
        path: &'a FinderPath,
        /// Key of the entry.
        key: &'a FinderKey,
    },
    /// A single entry was removed.
    Removed {
        /// Path of the entry.
        path: &'a FinderPath,
        /// Key of the entry.
        key: &'a FinderKey,
    },
    /// Every entry of one path was removed.
    FinderCleared {
        /// Namespace that was touched.
        namespace: CacheNamespace,
        /// Path name.
        path: &'a str,
    },
    /// A whole namespace was emptied.
    NamespaceCleared(CacheNamespace),
    /// Every namespace was emptied.
    Cleared,
}

/// Observer of finder cache changes, such as a cross-node broadcaster.
pub trait CacheListener: Send + Sync {
    /// Called after the cache changed.
    fn notify(&self, event: &CacheEvent<'_>);
}

/// Entries of one namespace, one bounded LRU per finder path.
struct Region {
    capacity: NonZeroUsize,
    paths: Mutex<HashMap<String, LruCache<FinderKey, CachedResult>>>,
}

impl Region {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            paths: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, path: &str, key: &FinderKey) -> Option<CachedResult> {
        let mut paths = self.paths.lock().ok()?;
        paths.get_mut(path)?.get(key).cloned()
    }

    fn put(&self, path: &str, key: FinderKey, result: CachedResult) {
        if let Ok(mut paths) = self.paths.lock() {
            if let Some(entries) = paths.get_mut(path) {
                entries.put(key, result);
            } else {
                let mut entries = LruCache::new(self.capacity);
                entries.put(key, result);
                paths.insert(path.to_owned(), entries);
            }
        }
    }

    fn remove(&self, path: &str, key: &FinderKey) -> Option<CachedResult> {
        let mut paths = self.paths.lock().ok()?;
        paths.get_mut(path)?.pop(key)
    }

    fn clear_path(&self, path: &str) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.remove(path);
        }
    }

    fn clear(&self) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.clear();
        }
    }

    fn len(&self) -> usize {
        self.paths
            .lock()
            .map_or(0, |paths| paths.values().map(LruCache::len).sum())
    }
}

/// Finder cache with one region per [`CacheNamespace`].
///
/// Each finder path keeps at most `capacity` entries, evicting the least
/// recently used.
pub struct FinderCache {
    enabled: bool,
    entity: Region,
    paginated: Region,
    unpaginated: Region,
    listeners: RwLock<Vec<Arc<dyn CacheListener>>>,
    counters: Counters,
}

impl FinderCache {
    /// Create an enabled cache holding at most `capacity` entries per path.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::build(true, capacity)
    }

    /// Create a cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::build(false, NonZeroUsize::MIN)
    }

    fn build(enabled: bool, capacity: NonZeroUsize) -> Self {
        Self {
            enabled,
            entity: Region::new(capacity),
            paginated: Region::new(capacity),
            unpaginated: Region::new(capacity),
            listeners: RwLock::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    /// Returns true unless built with [`FinderCache::disabled`].
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Register a listener for non-quiet changes.
    pub fn add_listener(&self, listener: Arc<dyn CacheListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    const fn region(&self, namespace: CacheNamespace) -> &Region {
        match namespace {
            CacheNamespace::Entity => &self.entity,
            CacheNamespace::Paginated => &self.paginated,
            CacheNamespace::Unpaginated => &self.unpaginated,
        }
    }

    fn emit(&self, event: &CacheEvent<'_>) {
        if let Ok(listeners) = self.listeners.read() {
            for listener in listeners.iter() {
                listener.notify(event);
            }
        }
    }

    /// Cached result, or `None` on a miss.
    pub fn get_result(&self, path: &FinderPath, key: &FinderKey) -> Option<CachedResult> {
        let found = if self.enabled {
            self.region(path.namespace()).get(path.name(), key)
        } else {
            None
        };
        if found.is_some() {
            self.counters.hit();
        } else {
            self.counters.miss();
        }
        found
    }

    /// Store a result; `quiet` suppresses listener notification.
    pub fn put_result(&self, path: &FinderPath, key: FinderKey, result: CachedResult, quiet: bool) {
        if !self.enabled {
            return;
        }
        if quiet {
            self.region(path.namespace()).put(path.name(), key, result);
        } else {
            self.region(path.namespace())
                .put(path.name(), key.clone(), result);
            self.emit(&CacheEvent::Put { path, key: &key });
        }
    }

    /// Remove one entry.
    pub fn remove_result(&self, path: &FinderPath, key: &FinderKey) {
        if self.region(path.namespace()).remove(path.name(), key).is_some() {
            self.emit(&CacheEvent::Removed { path, key });
        }
    }

    /// Remove every entry of one path.
    pub fn clear_finder(&self, path: &FinderPath) {
        self.region(path.namespace()).clear_path(path.name());
        self.emit(&CacheEvent::FinderCleared {
            namespace: path.namespace(),
            path: path.name(),
        });
    }

    /// Empty one namespace.
    pub fn clear_namespace(&self, namespace: CacheNamespace) {
        self.region(namespace).clear();
        self.emit(&CacheEvent::NamespaceCleared(namespace));
    }

    /// Empty every namespace.
    pub fn clear(&self) {
        for namespace in [
            CacheNamespace::Entity,
            CacheNamespace::Paginated,
            CacheNamespace::Unpaginated,
        ] {
            self.region(namespace).clear();
        }
        self.emit(&CacheEvent::Cleared);
    }

    /// Number of entries in one namespace.
    #[must_use]
    pub fn len(&self, namespace: CacheNamespace) -> usize {
        self.region(namespace).len()
    }

    /// Hit and miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::finder_path::{FinderDescriptor, FinderRegistry};
    use entity_store_core::Schema;

    fn cache() -> FinderCache {
        FinderCache::new(NonZeroUsize::new(16).unwrap())
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl CacheListener for Recorder {
        fn notify(&self, event: &CacheEvent<'_>) {
            let line = match event {
                CacheEvent::Put { path, .. } => format!("put {}", path.name()),
                CacheEvent::Removed { path, .. } => format!("removed {}", path.name()),
                CacheEvent::FinderCleared { path, .. } => format!("cleared {path}"),
                CacheEvent::NamespaceCleared(namespace) => format!("cleared {namespace:?}"),
                CacheEvent::Cleared => "cleared all".to_owned(),
            };
            self.events.lock().expect("lock events").push(line);
        }
    }

    fn registry() -> FinderRegistry {
        let schema = Schema::new("Entry", "id", &["id", "uuid", "groupId"]).unwrap();
        FinderRegistry::build(
            &schema,
            &[
                FinderDescriptor::non_unique("Uuid", &["uuid"]),
                FinderDescriptor::unique("UUID_G", &["uuid", "groupId"]),
            ],
        )
        .unwrap()
    }

    fn key(uuid: &str) -> FinderKey {
        FinderKey::new(vec![Value::from(uuid)])
    }

    #[test]
    fn miss_is_distinct_from_empty() {
        let registry = registry();
        let fetch = registry.get("UUID_G").unwrap().fetch_path().unwrap();
        let cache = cache();
        let k = FinderKey::new(vec![Value::from("x"), Value::from(1_i64)]);
        assert_eq!(cache.get_result(fetch, &k), None);
        cache.put_result(fetch, k.clone(), CachedResult::Empty, false);
        assert_eq!(cache.get_result(fetch, &k), Some(CachedResult::Empty));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn clear_finder_keeps_other_paths() {
        let registry = registry();
        let finder = registry.get("Uuid").unwrap();
        let list = finder.without_pagination_path().unwrap();
        let count = finder.count_path();
        let cache = cache();
        let pks: Arc<[PrimaryKey]> = vec![PrimaryKey::from(1)].into();
        cache.put_result(list, key("x"), CachedResult::List(pks), true);
        cache.put_result(count, key("x"), CachedResult::Count(1), true);

        cache.clear_finder(list);
        assert_eq!(cache.get_result(list, &key("x")), None);
        assert_eq!(cache.get_result(count, &key("x")), Some(CachedResult::Count(1)));
    }

    #[test]
    fn paginated_keys_include_window_and_order() {
        let registry = registry();
        let paginated = registry.get("Uuid").unwrap().with_pagination_path().unwrap();
        let cache = cache();
        let first = FinderKey::paginated(vec![Value::from("x")], Window::range(0, 1), None);
        let second = FinderKey::paginated(vec![Value::from("x")], Window::range(1, 2), None);
        cache.put_result(paginated, first.clone(), CachedResult::Count(0), true);
        assert!(cache.get_result(paginated, &first).is_some());
        assert!(cache.get_result(paginated, &second).is_none());

        cache.clear_namespace(CacheNamespace::Paginated);
        assert_eq!(cache.len(CacheNamespace::Paginated), 0);
    }

    #[test]
    fn listeners_skip_quiet_puts() {
        let registry = registry();
        let count = registry.get("Uuid").unwrap().count_path();
        let cache = cache();
        let recorder = Arc::new(Recorder::default());
        cache.add_listener(recorder.clone());

        cache.put_result(count, key("a"), CachedResult::Count(1), true);
        cache.put_result(count, key("b"), CachedResult::Count(2), false);
        cache.remove_result(count, &key("a"));
        cache.remove_result(count, &key("missing"));
        cache.clear();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["put countByUuid", "removed countByUuid", "cleared all"]);
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let registry = registry();
        let count = registry.get("Uuid").unwrap().count_path();
        let cache = FinderCache::disabled();
        cache.put_result(count, key("a"), CachedResult::Count(1), false);
        assert_eq!(cache.get_result(count, &key("a")), None);
        assert_eq!(cache.len(CacheNamespace::Unpaginated), 0);
    }

    #[test]
    fn each_path_evicts_least_recently_used() {
        let registry = registry();
        let finder = registry.get("Uuid").unwrap();
        let count = finder.count_path();
        let list = finder.without_pagination_path().unwrap();
        let cache = FinderCache::new(NonZeroUsize::new(2).unwrap());
        cache.put_result(count, key("a"), CachedResult::Count(1), true);
        cache.put_result(count, key("b"), CachedResult::Count(2), true);
        cache.put_result(list, key("a"), CachedResult::Count(3), true);
        assert!(cache.get_result(count, &key("a")).is_some());

        cache.put_result(count, key("c"), CachedResult::Count(4), true);
        assert_eq!(cache.get_result(count, &key("b")), None);
        assert_eq!(cache.get_result(count, &key("a")), Some(CachedResult::Count(1)));
        assert_eq!(cache.get_result(list, &key("a")), Some(CachedResult::Count(3)));
        assert_eq!(cache.len(CacheNamespace::Unpaginated), 3);
    }
}
