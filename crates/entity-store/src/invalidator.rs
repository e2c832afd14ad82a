//! Finder cache invalidation after writes.

use crate::finder_cache::{CachedResult, FinderCache, FinderKey};
use crate::finder_path::{CacheNamespace, Finder, FinderRegistry};
use entity_store_core::{ColumnMask, Entity, Schema};

/// Write being applied, with the snapshots the invalidator needs.
#[derive(Debug)]
pub enum Change<'a, E> {
    /// A new entity was persisted.
    Insert(&'a E),
    /// An existing entity changed from `before` to `after`.
    Update {
        /// Persisted state before the write.
        before: &'a E,
        /// Persisted state after the write.
        after: &'a E,
    },
    /// An entity was deleted.
    Delete(&'a E),
}

impl<E> Change<'_, E> {
    const fn current(&self) -> &E {
        match self {
            Self::Insert(entity) | Self::Delete(entity) | Self::Update { after: entity, .. } => *entity,
        }
    }
}

/// Evicts finder entries a write may have made stale.
pub struct CacheInvalidator<'a> {
    schema: &'a Schema,
    registry: &'a FinderRegistry,
    cache: &'a FinderCache,
    column_bitmask_enabled: bool,
}

impl<'a> CacheInvalidator<'a> {
    /// Bind an invalidator to one store's schema, finders and cache.
    #[must_use]
    pub const fn new(
        schema: &'a Schema,
        registry: &'a FinderRegistry,
        cache: &'a FinderCache,
        column_bitmask_enabled: bool,
    ) -> Self {
        Self {
            schema,
            registry,
            cache,
            column_bitmask_enabled,
        }
    }

    /// Evict every entry `change` may have invalidated, then re-seed the
    /// unique finders of the written entity.
    pub fn apply<E: Entity>(&self, change: &Change<'_, E>) {
        let changed = match change {
            Change::Insert(_) | Change::Delete(_) => ColumnMask::ALL,
            Change::Update { before, after } => self.schema.changed_columns(*before, *after),
        };
        if changed.is_empty() {
            return;
        }

        self.cache.clear_namespace(CacheNamespace::Paginated);

        for finder in self.registry.unique_finders() {
            self.clear_unique(finder, change, changed);
        }

        if self.column_bitmask_enabled {
            for finder in self.registry.list_finders() {
                if finder.mask().intersects(changed) || !matches!(change, Change::Update { .. }) {
                    Self::clear_list(self.cache, finder);
                }
            }
        } else {
            self.cache.clear_namespace(CacheNamespace::Unpaginated);
        }

        if !matches!(change, Change::Delete(_)) {
            self.seed_unique(change.current());
        }
    }

    /// Store the unique finder mappings of a freshly written `entity` with a
    /// count of one.
    pub fn seed_unique<E: Entity>(&self, entity: &E) {
        self.cache_unique(entity);
        for finder in self.registry.unique_finders() {
            self.cache.put_result(
                finder.count_path(),
                FinderKey::new(finder.args_of(entity)),
                CachedResult::Count(1),
                true,
            );
        }
    }

    /// Store the unique finder mappings of a loaded `entity`.
    ///
    /// Counts are left alone: a read cannot tell whether other rows share
    /// the same unique key.
    pub fn cache_unique<E: Entity>(&self, entity: &E) {
        let primary_key = entity.primary_key();
        for finder in self.registry.unique_finders() {
            if let Some(fetch) = finder.fetch_path() {
                self.cache.put_result(
                    fetch,
                    FinderKey::new(finder.args_of(entity)),
                    CachedResult::Entity(primary_key.clone()),
                    true,
                );
            }
        }
    }

    /// Drop the unique finder entries keyed by the current values of `entity`.
    pub fn forget_unique<E: Entity>(&self, entity: &E) {
        for finder in self.registry.unique_finders() {
            self.remove_unique(finder, FinderKey::new(finder.args_of(entity)));
        }
    }

    fn clear_unique<E: Entity>(&self, finder: &Finder, change: &Change<'_, E>, changed: ColumnMask) {
        self.remove_unique(finder, FinderKey::new(finder.args_of(change.current())));
        if let Change::Update { before, .. } = change
            && finder.mask().intersects(changed)
        {
            self.remove_unique(finder, FinderKey::new(finder.args_of(*before)));
        }
    }

    fn remove_unique(&self, finder: &Finder, key: FinderKey) {
        if let Some(fetch) = finder.fetch_path() {
            self.cache.remove_result(fetch, &key);
        }
        self.cache.remove_result(finder.count_path(), &key);
    }

    fn clear_list(cache: &FinderCache, finder: &Finder) {
        if let Some(path) = finder.without_pagination_path() {
            cache.clear_finder(path);
        }
        cache.clear_finder(finder.count_path());
    }
}
