//! Caching entity store in front of a [`QueryExecutor`].

use crate::config::StoreConfig;
use crate::entity_cache::{CacheStats, EntityCache, EntityLookup};
use crate::error::StoreError;
use crate::finder_cache::{CacheListener, CachedResult, FinderCache, FinderKey};
use crate::finder_path::{CacheNamespace, Finder, FinderDescriptor, FinderPath, FinderRegistry};
use crate::invalidator::{CacheInvalidator, Change};
use entity_store_core::{
    Entity, OrderByComparator, Predicate, PrimaryKey, Query, QueryExecutor, Schema, Seek, Value,
    Window, new_uuid,
};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use time::OffsetDateTime;
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, StoreError>;

/// Per-entity description a store is built from.
#[derive(Debug, Clone)]
pub struct EntityConfig {
    /// Columns, primary key and physical names.
    pub schema: Schema,
    /// Table name used when rendering queries.
    pub table: String,
    /// Finders beyond the built-in `All`.
    pub finders: Vec<FinderDescriptor>,
    /// Ordering applied to paginated queries without a caller ordering.
    pub default_order: Option<OrderByComparator>,
}

/// Whether a lookup may be answered from the finder cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve from and populate the cache.
    #[default]
    Use,
    /// Skip the lookup but still populate the cache.
    Bypass,
}

/// A finder invocation: name, arguments and result shaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderQuery {
    finder: String,
    args: Vec<Value>,
    window: Window,
    order: Option<OrderByComparator>,
    cache_mode: CacheMode,
}

impl FinderQuery {
    /// Invoke the named finder; add arguments with [`FinderQuery::arg`].
    #[must_use]
    pub fn new(finder: impl Into<String>) -> Self {
        Self {
            finder: finder.into(),
            args: Vec::new(),
            window: Window::All,
            order: None,
            cache_mode: CacheMode::Use,
        }
    }

    /// Invoke the built-in `All` finder.
    #[must_use]
    pub fn all() -> Self {
        Self::new(FinderRegistry::ALL)
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Replace the arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Restrict results to a window.
    #[must_use]
    pub const fn window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    /// Restrict results to rows `start..end`.
    #[must_use]
    pub const fn range(self, start: usize, end: usize) -> Self {
        self.window(Window::range(start, end))
    }

    /// Order results.
    #[must_use]
    pub fn order_by(mut self, order: OrderByComparator) -> Self {
        self.order = Some(order);
        self
    }

    /// Skip the finder cache lookup.
    #[must_use]
    pub const fn bypass_cache(mut self) -> Self {
        self.cache_mode = CacheMode::Bypass;
        self
    }

    /// Finder name.
    #[must_use]
    pub fn finder(&self) -> &str {
        &self.finder
    }

    /// Arguments in finder column order.
    #[must_use]
    pub fn arguments(&self) -> &[Value] {
        &self.args
    }

    fn uses_cache(&self) -> bool {
        self.cache_mode == CacheMode::Use
    }

    fn is_paginated(&self) -> bool {
        !self.window.is_all() || self.order.is_some()
    }
}

/// Neighbours of an entity under some ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevAndNext<E> {
    /// Row immediately before `current`.
    pub previous: Option<E>,
    /// The anchor entity.
    pub current: E,
    /// Row immediately after `current`.
    pub next: Option<E>,
}

impl<E> PrevAndNext<E> {
    /// `[previous, current, next]`.
    pub fn into_array(self) -> [Option<E>; 3] {
        [self.previous, Some(self.current), self.next]
    }
}

/// Timestamps supplied by the caller for one write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteContext {
    /// Creation date for new entities.
    pub create_date: Option<OffsetDateTime>,
    /// Modification date, unless the entity carries its own.
    pub modified_date: Option<OffsetDateTime>,
}

/// Source of the tenant id stamped on created entities.
pub trait CompanyProvider: Send + Sync {
    /// Current company id.
    fn company_id(&self) -> i64;
}

/// A [`CompanyProvider`] returning a fixed id.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCompany(pub i64);

impl CompanyProvider for FixedCompany {
    fn company_id(&self) -> i64 {
        self.0
    }
}

/// Hit and miss counters of both caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Entity cache counters.
    pub entity_cache: CacheStats,
    /// Finder cache counters.
    pub finder_cache: CacheStats,
}

/// Keeps rows loaded before a write from being cached after it.
///
/// Writes hold the lock exclusively from the executor call through cache
/// invalidation, so cache updates land in the order the executor applied them.
#[derive(Default)]
struct PopulationGate {
    epoch: AtomicU64,
    lock: RwLock<()>,
}

impl PopulationGate {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn populate(&self, seen: u64, fill: impl FnOnce()) {
        let guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::Acquire) == seen {
            fill();
        }
        drop(guard);
    }

    fn write<T>(&self, apply: impl FnOnce() -> T) -> T {
        let guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let applied = apply();
        drop(guard);
        applied
    }
}

/// Two-level cache (entities by primary key, finder results by query shape)
/// over one entity type.
pub struct EntityStore<E: Entity, X: QueryExecutor<E>> {
    executor: Arc<X>,
    schema: Schema,
    table: String,
    registry: FinderRegistry,
    default_order: Option<OrderByComparator>,
    entity_cache: EntityCache<E>,
    finder_cache: FinderCache,
    column_bitmask_enabled: bool,
    company: Arc<dyn CompanyProvider>,
    gate: PopulationGate,
}

impl<E: Entity, X: QueryExecutor<E>> EntityStore<E, X> {
    /// Build a store for one entity type.
    ///
    /// # Errors
    /// Returns an error when the configuration is invalid or the finders do
    /// not fit the schema.
    pub fn new(executor: Arc<X>, entity: EntityConfig, config: &StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::Config)?;
        let schema = entity.schema.with_physical_names(
            config
                .columns
                .iter()
                .map(|(logical, physical)| (logical.as_str(), physical.as_str())),
        )?;
        let registry = FinderRegistry::build(&schema, &entity.finders)?;
        let entity_cache = if config.entity_cache.enabled {
            EntityCache::new(config.entity_cache_capacity().map_err(StoreError::Config)?)
        } else {
            EntityCache::disabled()
        };
        let finder_cache = if config.finder_cache.enabled {
            FinderCache::new(config.finder_cache_capacity().map_err(StoreError::Config)?)
        } else {
            FinderCache::disabled()
        };
        let default_order = entity.default_order.map(|order| order.resolved(&schema));

        Ok(Self {
            executor,
            schema,
            table: entity.table,
            registry,
            default_order,
            entity_cache,
            finder_cache,
            column_bitmask_enabled: config.column_bitmask_enabled,
            company: Arc::new(FixedCompany::default()),
            gate: PopulationGate::default(),
        })
    }

    /// Use `provider` for the company id of created entities.
    #[must_use]
    pub fn with_company_provider(mut self, provider: Arc<dyn CompanyProvider>) -> Self {
        self.company = provider;
        self
    }

    /// Register a finder cache listener.
    pub fn add_listener(&self, listener: Arc<dyn CacheListener>) {
        self.finder_cache.add_listener(listener);
    }

    /// Entity schema with physical names applied.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Registered finders.
    #[must_use]
    pub const fn registry(&self) -> &FinderRegistry {
        &self.registry
    }

    /// Backing executor.
    #[must_use]
    pub const fn executor(&self) -> &Arc<X> {
        &self.executor
    }

    const fn invalidator(&self) -> CacheInvalidator<'_> {
        CacheInvalidator::new(
            &self.schema,
            &self.registry,
            &self.finder_cache,
            self.column_bitmask_enabled,
        )
    }

    fn list_finder(&self, name: &str) -> Result<&Finder> {
        let finder = self.registry.get(name)?;
        if finder.is_unique() {
            return Err(StoreError::UniqueFinder(name.to_owned()));
        }
        Ok(finder)
    }

    fn unique_finder(&self, name: &str) -> Result<&Finder> {
        let finder = self.registry.get(name)?;
        if !finder.is_unique() {
            return Err(StoreError::NotUnique(name.to_owned()));
        }
        Ok(finder)
    }

    fn not_found(&self, query: &FinderQuery) -> StoreError {
        let args = self
            .registry
            .get(&query.finder)
            .map(|finder| finder.describe_args(&query.args))
            .unwrap_or_default();
        StoreError::EntityNotFound {
            entity: self.schema.entity_name().to_owned(),
            finder: query.finder.clone(),
            args,
        }
    }

    fn primary_key_not_found(&self, primary_key: &PrimaryKey) -> StoreError {
        StoreError::EntityNotFound {
            entity: self.schema.entity_name().to_owned(),
            finder: "PrimaryKey".to_owned(),
            args: format!("{}={primary_key}", self.schema.primary_key_column()),
        }
    }

    fn query(&self, predicate: Predicate) -> Query {
        Query::new(self.table.clone(), predicate)
    }

    fn cache_loaded(&self, entities: &[E]) {
        let invalidator = self.invalidator();
        for entity in entities {
            self.entity_cache.put(entity.primary_key(), entity.clone());
            invalidator.cache_unique(entity);
        }
    }

    /// Entities matched by a list finder.
    ///
    /// Unpaginated results (no window, no ordering) are sorted by primary key;
    /// paginated results follow the caller ordering or the entity's default.
    ///
    /// # Errors
    /// Returns an error for unknown or unique finders, bad arguments, or
    /// executor failures.
    pub fn find(&self, query: &FinderQuery) -> Result<Vec<E>> {
        let finder = self.list_finder(&query.finder)?;
        finder.check_args(&query.args)?;
        let paginated = query.is_paginated();
        let (path, key) = if paginated {
            (
                finder.with_pagination_path(),
                FinderKey::paginated(query.args.clone(), query.window, query.order.clone()),
            )
        } else {
            (finder.without_pagination_path(), FinderKey::new(query.args.clone()))
        };
        let path = path.ok_or_else(|| StoreError::UniqueFinder(query.finder.clone()))?;
        let predicate = finder.predicate(&query.args);

        if query.uses_cache()
            && let Some(CachedResult::List(keys)) = self.finder_cache.get_result(path, &key)
            && let Some(entities) = self.resolve_list(path, &key, &keys, &predicate)?
        {
            return Ok(entities);
        }

        let order = if paginated {
            query
                .order
                .as_ref()
                .map(|order| order.resolved(&self.schema))
                .or_else(|| self.default_order.clone())
        } else {
            None
        };
        let db_query = self.query(predicate).with_order(order).with_window(query.window);
        let seen = self.gate.epoch();
        debug!(finder = path.name(), query = %db_query, "Finder cache miss");

        let mut entities = match self.executor.list(&db_query) {
            Ok(entities) => entities,
            Err(err) => {
                self.finder_cache.remove_result(path, &key);
                return Err(StoreError::execution(path.name(), err));
            }
        };
        if !paginated {
            entities.sort_by_cached_key(Entity::primary_key);
        }

        let keys: Arc<[PrimaryKey]> = entities.iter().map(Entity::primary_key).collect();
        self.gate.populate(seen, || {
            self.cache_loaded(&entities);
            self.finder_cache
                .put_result(path, key, CachedResult::List(keys), false);
        });
        Ok(entities)
    }

    fn resolve_list(
        &self,
        path: &FinderPath,
        finder_key: &FinderKey,
        keys: &[PrimaryKey],
        predicate: &Predicate,
    ) -> Result<Option<Vec<E>>> {
        let mut resolved = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.entity_cache.get(key) {
                EntityLookup::Hit(entity) => resolved.push(Some(entity)),
                EntityLookup::Tombstone => return Ok(None),
                EntityLookup::Miss => {
                    resolved.push(None);
                    missing.push(key.clone());
                }
            }
        }

        if !missing.is_empty() {
            let seen = self.gate.epoch();
            let loaded = match self.executor.get_many(&missing) {
                Ok(loaded) => loaded,
                Err(err) => {
                    self.finder_cache.remove_result(path, finder_key);
                    return Err(StoreError::execution(path.name(), err));
                }
            };
            let mut by_key: HashMap<PrimaryKey, E> = loaded
                .into_iter()
                .map(|entity| (entity.primary_key(), entity))
                .collect();
            self.gate.populate(seen, || {
                for (key, entity) in &by_key {
                    self.entity_cache.put(key.clone(), entity.clone());
                }
            });
            for (slot, key) in resolved.iter_mut().zip(keys) {
                if slot.is_none() {
                    *slot = by_key.remove(key);
                }
            }
        }

        let Some(entities) = resolved.into_iter().collect::<Option<Vec<E>>>() else {
            return Ok(None);
        };
        if entities.iter().all(|entity| predicate.matches(entity)) {
            Ok(Some(entities))
        } else {
            debug!(%predicate, "Cached list no longer matches its finder");
            Ok(None)
        }
    }

    /// Every entity, sorted by primary key.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn find_all(&self) -> Result<Vec<E>> {
        self.find(&FinderQuery::all())
    }

    /// First entity under the query ordering, if any.
    ///
    /// # Errors
    /// See [`EntityStore::find`].
    pub fn fetch_first(&self, query: &FinderQuery) -> Result<Option<E>> {
        let first = query.clone().window(Window::range(0, 1));
        Ok(self.find(&first)?.into_iter().next())
    }

    /// Last entity under the query ordering, if any.
    ///
    /// # Errors
    /// See [`EntityStore::find`].
    pub fn fetch_last(&self, query: &FinderQuery) -> Result<Option<E>> {
        let count = usize::try_from(self.count(query)?).unwrap_or(usize::MAX);
        if count == 0 {
            return Ok(None);
        }
        let last = query.clone().window(Window::range(count - 1, count));
        Ok(self.find(&last)?.into_iter().next())
    }

    /// Like [`EntityStore::fetch_first`], failing when nothing matches.
    ///
    /// # Errors
    /// Returns [`StoreError::EntityNotFound`] when nothing matches.
    pub fn find_first(&self, query: &FinderQuery) -> Result<E> {
        self.fetch_first(query)?.ok_or_else(|| self.not_found(query))
    }

    /// Like [`EntityStore::fetch_last`], failing when nothing matches.
    ///
    /// # Errors
    /// Returns [`StoreError::EntityNotFound`] when nothing matches.
    pub fn find_last(&self, query: &FinderQuery) -> Result<E> {
        self.fetch_last(query)?.ok_or_else(|| self.not_found(query))
    }

    /// Entities immediately before and after `primary_key` among the query's
    /// matches.
    ///
    /// Rows tied with the anchor on every ordering column are neither
    /// previous nor next. Neighbours are always read from the executor.
    ///
    /// # Errors
    /// Returns [`StoreError::EntityNotFound`] when the anchor does not exist.
    pub fn find_prev_and_next(
        &self,
        primary_key: &PrimaryKey,
        query: &FinderQuery,
    ) -> Result<PrevAndNext<E>> {
        let finder = self.registry.get(&query.finder)?;
        finder.check_args(&query.args)?;
        let current = self.find_by_primary_key(primary_key)?;

        let order = query
            .order
            .as_ref()
            .map(|order| order.resolved(&self.schema))
            .or_else(|| self.default_order.clone())
            .unwrap_or_else(|| {
                OrderByComparator::asc(self.schema.primary_key_column()).resolved(&self.schema)
            });
        let predicate = finder.predicate(&query.args);
        let anchor = order.anchor_values(&current);

        let previous = self.seek_one(&predicate, order.reversed(), &anchor)?;
        let next = self.seek_one(&predicate, order, &anchor)?;
        Ok(PrevAndNext {
            previous,
            current,
            next,
        })
    }

    fn seek_one(&self, predicate: &Predicate, order: OrderByComparator, anchor: &[Value]) -> Result<Option<E>> {
        let query = self
            .query(predicate.clone())
            .with_order(Some(order))
            .with_seek(Seek::after(anchor.to_vec()))
            .with_window(Window::range(0, 1));
        debug!(%query, "Seeking neighbour");
        let rows = self
            .executor
            .list(&query)
            .map_err(|err| StoreError::execution("findPrevAndNext", err))?;
        Ok(rows.into_iter().next())
    }

    /// Number of entities a finder matches.
    ///
    /// # Errors
    /// Returns an error for unknown finders, bad arguments, or executor failures.
    pub fn count(&self, query: &FinderQuery) -> Result<u64> {
        let finder = self.registry.get(&query.finder)?;
        finder.check_args(&query.args)?;
        let path = finder.count_path();
        let key = FinderKey::new(query.args.clone());

        if query.uses_cache()
            && let Some(CachedResult::Count(count)) = self.finder_cache.get_result(path, &key)
        {
            return Ok(count);
        }

        let predicate = finder.predicate(&query.args);
        let seen = self.gate.epoch();
        debug!(finder = path.name(), %predicate, "Finder cache miss");
        let count = match self.executor.count(&predicate) {
            Ok(count) => count,
            Err(err) => {
                self.finder_cache.remove_result(path, &key);
                return Err(StoreError::execution(path.name(), err));
            }
        };
        self.gate.populate(seen, || {
            self.finder_cache
                .put_result(path, key, CachedResult::Count(count), false);
        });
        Ok(count)
    }

    /// Number of entities.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn count_all(&self) -> Result<u64> {
        self.count(&FinderQuery::all())
    }

    /// Remove every entity a list finder matches, one at a time.
    ///
    /// Not atomic: a failure leaves earlier removals in place.
    ///
    /// # Errors
    /// Returns the first lookup or removal error.
    pub fn remove_by(&self, query: &FinderQuery) -> Result<usize> {
        let everything = FinderQuery {
            window: Window::All,
            order: None,
            ..query.clone()
        };
        let entities = self.find(&everything)?;
        for entity in &entities {
            self.remove_entity(entity)?;
        }
        Ok(entities.len())
    }

    /// Remove every entity.
    ///
    /// # Errors
    /// Returns the first lookup or removal error.
    pub fn remove_all(&self) -> Result<usize> {
        self.remove_by(&FinderQuery::all())
    }

    /// Entity matched by a unique finder, if any.
    ///
    /// When the backing store holds several matches the one with the greatest
    /// primary key wins and an integrity warning is logged.
    ///
    /// # Errors
    /// Returns an error for non-unique finders, bad arguments, or executor failures.
    pub fn fetch_unique(&self, query: &FinderQuery) -> Result<Option<E>> {
        let finder = self.unique_finder(&query.finder)?;
        finder.check_args(&query.args)?;
        let path = finder
            .fetch_path()
            .ok_or_else(|| StoreError::NotUnique(query.finder.clone()))?;
        let key = FinderKey::new(query.args.clone());
        let predicate = finder.predicate(&query.args);

        if query.uses_cache() {
            match self.finder_cache.get_result(path, &key) {
                Some(CachedResult::Empty) => return Ok(None),
                Some(CachedResult::Entity(primary_key)) => {
                    if let Some(entity) = self.fetch_by_primary_key(&primary_key)?
                        && predicate.matches(&entity)
                    {
                        return Ok(Some(entity));
                    }
                    debug!(finder = path.name(), key = %primary_key, "Cached entity no longer matches its finder");
                }
                _ => {}
            }
        }

        let db_query = self.query(predicate);
        let seen = self.gate.epoch();
        debug!(finder = path.name(), query = %db_query, "Finder cache miss");
        let mut entities = match self.executor.list(&db_query) {
            Ok(entities) => entities,
            Err(err) => {
                self.finder_cache.remove_result(path, &key);
                return Err(StoreError::execution(path.name(), err));
            }
        };
        if entities.len() > 1 {
            entities.sort_by_cached_key(|entity| Reverse(entity.primary_key()));
            warn!(
                finder = path.name(),
                args = %finder.describe_args(&query.args),
                rows = entities.len(),
                "Unique finder matched more than one row; using the greatest primary key"
            );
        }

        let found = entities.into_iter().next();
        self.gate.populate(seen, || match &found {
            Some(entity) => {
                self.cache_loaded(std::slice::from_ref(entity));
                self.finder_cache
                    .put_result(path, key, CachedResult::Entity(entity.primary_key()), false);
            }
            None => self.finder_cache.put_result(path, key, CachedResult::Empty, false),
        });
        Ok(found)
    }

    /// Like [`EntityStore::fetch_unique`], failing when nothing matches.
    ///
    /// # Errors
    /// Returns [`StoreError::EntityNotFound`] when nothing matches.
    pub fn find_unique(&self, query: &FinderQuery) -> Result<E> {
        self.fetch_unique(query)?.ok_or_else(|| self.not_found(query))
    }

    /// Remove the entity a unique finder matches.
    ///
    /// # Errors
    /// Returns [`StoreError::EntityNotFound`] when nothing matches.
    pub fn remove_unique(&self, query: &FinderQuery) -> Result<E> {
        let entity = self.find_unique(query)?;
        self.remove_entity(&entity)
    }

    /// Entity with this primary key, if any. Absent keys are remembered.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn fetch_by_primary_key(&self, primary_key: &PrimaryKey) -> Result<Option<E>> {
        match self.entity_cache.get(primary_key) {
            EntityLookup::Hit(entity) => return Ok(Some(entity)),
            EntityLookup::Tombstone => return Ok(None),
            EntityLookup::Miss => {}
        }

        let seen = self.gate.epoch();
        let loaded = match self.executor.get(primary_key) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.entity_cache.remove(primary_key);
                return Err(StoreError::execution("fetchByPrimaryKey", err));
            }
        };
        self.gate.populate(seen, || match &loaded {
            Some(entity) => self.entity_cache.put(primary_key.clone(), entity.clone()),
            None => self.entity_cache.put_tombstone(primary_key.clone()),
        });
        Ok(loaded)
    }

    /// Entity with this primary key.
    ///
    /// # Errors
    /// Returns [`StoreError::EntityNotFound`] when the key does not exist.
    pub fn find_by_primary_key(&self, primary_key: &PrimaryKey) -> Result<E> {
        self.fetch_by_primary_key(primary_key)?
            .ok_or_else(|| self.primary_key_not_found(primary_key))
    }

    /// Entities for several keys; absent keys are left out and remembered.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn fetch_by_primary_keys(&self, primary_keys: &[PrimaryKey]) -> Result<HashMap<PrimaryKey, E>> {
        let mut found = HashMap::with_capacity(primary_keys.len());
        let mut missing = Vec::new();
        for key in primary_keys {
            match self.entity_cache.get(key) {
                EntityLookup::Hit(entity) => {
                    found.insert(key.clone(), entity);
                }
                EntityLookup::Tombstone => {}
                EntityLookup::Miss => missing.push(key.clone()),
            }
        }
        if missing.is_empty() {
            return Ok(found);
        }

        let seen = self.gate.epoch();
        let loaded = self
            .executor
            .get_many(&missing)
            .map_err(|err| StoreError::execution("fetchByPrimaryKeys", err))?;
        for entity in loaded {
            found.insert(entity.primary_key(), entity);
        }
        self.gate.populate(seen, || {
            for key in &missing {
                match found.get(key) {
                    Some(entity) => self.entity_cache.put(key.clone(), entity.clone()),
                    None => self.entity_cache.put_tombstone(key.clone()),
                }
            }
        });
        Ok(found)
    }

    /// New, unpersisted entity with a fresh uuid and the current company id.
    #[must_use]
    pub fn create(&self, primary_key: PrimaryKey) -> E {
        let mut entity = E::with_primary_key(primary_key);
        entity.set_new(true);
        let audit = entity.audit_mut();
        audit.uuid = new_uuid();
        audit.company_id = self.company.company_id();
        entity
    }

    /// Insert a new entity or merge an existing one, stamping audit dates
    /// from the wall clock.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn update(&self, entity: E) -> Result<E> {
        self.update_with(entity, &WriteContext::default())
    }

    /// Insert or merge with caller-supplied timestamps.
    ///
    /// Both caches reflect the write when this returns.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn update_with(&self, mut entity: E, context: &WriteContext) -> Result<E> {
        let is_new = entity.is_new();
        let now = OffsetDateTime::now_utc();
        let audit = entity.audit_mut();
        if audit.uuid.is_empty() {
            audit.uuid = new_uuid();
        }
        if is_new && audit.create_date.is_none() {
            audit.create_date = Some(context.create_date.unwrap_or(now));
        }
        if !audit.has_set_modified_date() {
            audit.stamp_modified_date(context.modified_date.unwrap_or(now));
        }
        audit.reset_modified_date_flag();

        let key = entity.primary_key();
        let stored = self.gate.write(|| {
            let before = if is_new { None } else { self.persisted_state(&key)? };
            let mut stored = if is_new {
                self.executor
                    .insert(&entity)
                    .map_err(|err| StoreError::execution("update", err))?;
                entity
            } else {
                self.executor
                    .merge(&entity)
                    .map_err(|err| StoreError::execution("update", err))?
            };
            stored.set_new(false);

            self.entity_cache.put(key.clone(), stored.clone());
            let change = before.as_ref().map_or(Change::Insert(&stored), |before| Change::Update {
                before,
                after: &stored,
            });
            self.invalidator().apply(&change);
            Ok::<_, StoreError>(stored)
        })?;
        debug!(entity = self.schema.entity_name(), %key, inserted = is_new, "Updated entity");
        Ok(stored)
    }

    fn persisted_state(&self, key: &PrimaryKey) -> Result<Option<E>> {
        if let EntityLookup::Hit(entity) = self.entity_cache.get(key) {
            return Ok(Some(entity));
        }
        self.executor
            .get(key)
            .map_err(|err| StoreError::execution("fetchByPrimaryKey", err))
    }

    /// Delete the entity with this primary key and evict every cache entry
    /// referencing it.
    ///
    /// # Errors
    /// Returns [`StoreError::EntityNotFound`] when the key does not exist.
    pub fn remove(&self, primary_key: &PrimaryKey) -> Result<E> {
        let removed = self.gate.write(|| {
            let removed = self
                .executor
                .delete(primary_key)
                .map_err(|err| StoreError::execution("remove", err))?
                .ok_or_else(|| self.primary_key_not_found(primary_key))?;
            self.entity_cache.remove(primary_key);
            self.invalidator().apply(&Change::Delete(&removed));
            Ok::<_, StoreError>(removed)
        })?;
        debug!(entity = self.schema.entity_name(), key = %primary_key, "Removed entity");
        Ok(removed)
    }

    /// Delete a previously loaded entity.
    ///
    /// # Errors
    /// See [`EntityStore::remove`].
    pub fn remove_entity(&self, entity: &E) -> Result<E> {
        self.remove(&entity.primary_key())
    }

    /// Seed both caches with an entity loaded elsewhere.
    pub fn cache_result(&self, entity: &E) {
        self.cache_loaded(std::slice::from_ref(entity));
    }

    /// Seed both caches with several entities.
    pub fn cache_results(&self, entities: &[E]) {
        self.cache_loaded(entities);
    }

    /// Drop every cached entity and finder result.
    pub fn clear_cache(&self) {
        self.gate.write(|| {
            self.entity_cache.clear();
            self.finder_cache.clear();
        });
    }

    /// Drop one entity, its unique finder entries and all cached lists.
    pub fn clear_cache_for(&self, entity: &E) {
        self.gate.write(|| {
            self.entity_cache.remove(&entity.primary_key());
            self.finder_cache.clear_namespace(CacheNamespace::Paginated);
            self.finder_cache.clear_namespace(CacheNamespace::Unpaginated);
            self.invalidator().forget_unique(entity);
        });
    }

    /// Cache hit and miss counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entity_cache: self.entity_cache.stats(),
            finder_cache: self.finder_cache.stats(),
        }
    }
}
