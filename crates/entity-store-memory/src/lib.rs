//! In-memory backing store for the entity store engine.

/// Error types for in-memory table operations.
pub mod error;

pub use error::MemoryStoreError;

use entity_store_core::{Entity, Predicate, PrimaryKey, Query, QueryExecutor};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info};

type Result<T> = std::result::Result<T, MemoryStoreError>;

/// Number of executor calls served, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// `list` calls.
    pub lists: u64,
    /// `count` calls.
    pub counts: u64,
    /// `get` and `get_many` calls.
    pub gets: u64,
    /// `insert`, `merge` and `delete` calls.
    pub writes: u64,
}

#[derive(Default)]
struct CallCounters {
    lists: AtomicU64,
    counts: AtomicU64,
    gets: AtomicU64,
    writes: AtomicU64,
}

struct StoredRow<E> {
    seq: u64,
    entity: E,
}

/// A single table of rows behind a lock.
///
/// Unordered queries return rows in insertion order, like a heap table
/// without an index, so callers that need a stable order must ask for one.
pub struct MemoryTable<E: Entity> {
    name: String,
    rows: RwLock<BTreeMap<PrimaryKey, StoredRow<E>>>,
    next_seq: AtomicU64,
    calls: CallCounters,
    pending_failure: Mutex<Option<String>>,
}

impl<E: Entity> MemoryTable<E> {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
            calls: CallCounters::default(),
            pending_failure: Mutex::new(None),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().map_or(0, |rows| rows.len())
    }

    /// Returns true when the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the executor calls served so far.
    #[must_use]
    pub fn call_stats(&self) -> CallStats {
        CallStats {
            lists: self.calls.lists.load(Ordering::Relaxed),
            counts: self.calls.counts.load(Ordering::Relaxed),
            gets: self.calls.gets.load(Ordering::Relaxed),
            writes: self.calls.writes.load(Ordering::Relaxed),
        }
    }

    /// Make the next executor call fail with [`MemoryStoreError::Injected`].
    pub fn fail_next_call(&self, message: impl Into<String>) {
        if let Ok(mut pending) = self.pending_failure.lock() {
            *pending = Some(message.into());
        }
    }

    fn take_failure(&self) -> Result<()> {
        let mut pending = self
            .pending_failure
            .lock()
            .map_err(|_| MemoryStoreError::LockError)?;
        pending.take().map_or(Ok(()), |message| Err(MemoryStoreError::Injected(message)))
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}

impl<E: Entity> QueryExecutor<E> for MemoryTable<E> {
    type Error = MemoryStoreError;

    fn list(&self, query: &Query) -> Result<Vec<E>> {
        self.calls.lists.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;

        let rows = self.rows.read().map_err(|_| MemoryStoreError::LockError)?;
        let mut matched: Vec<&StoredRow<E>> = rows
            .values()
            .filter(|row| query.predicate().matches(&row.entity))
            .filter(|row| match (query.seek(), query.order()) {
                (Some(seek), Some(order)) => seek.admits(order, &row.entity),
                _ => true,
            })
            .collect();
        matched.sort_by_key(|row| row.seq);

        let mut entities: Vec<E> = matched.into_iter().map(|row| row.entity.clone()).collect();
        if let Some(order) = query.order() {
            entities.sort_by(|a, b| {
                order
                    .compare(a, b)
                    .then_with(|| a.primary_key().cmp(&b.primary_key()))
            });
        }
        let entities = query.window().apply(entities);

        debug!(table = %self.name, %query, rows = entities.len(), "Executed query");
        Ok(entities)
    }

    fn count(&self, predicate: &Predicate) -> Result<u64> {
        self.calls.counts.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;

        let rows = self.rows.read().map_err(|_| MemoryStoreError::LockError)?;
        let count = rows
            .values()
            .filter(|row| predicate.matches(&row.entity))
            .count() as u64;
        debug!(table = %self.name, %predicate, count, "Executed count");
        Ok(count)
    }

    fn get(&self, primary_key: &PrimaryKey) -> Result<Option<E>> {
        self.calls.gets.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;

        let rows = self.rows.read().map_err(|_| MemoryStoreError::LockError)?;
        Ok(rows.get(primary_key).map(|row| row.entity.clone()))
    }

    fn get_many(&self, primary_keys: &[PrimaryKey]) -> Result<Vec<E>> {
        self.calls.gets.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;

        let rows = self.rows.read().map_err(|_| MemoryStoreError::LockError)?;
        Ok(primary_keys
            .iter()
            .filter_map(|key| rows.get(key).map(|row| row.entity.clone()))
            .collect())
    }

    fn insert(&self, entity: &E) -> Result<()> {
        self.calls.writes.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;

        let key = entity.primary_key();
        let mut rows = self.rows.write().map_err(|_| MemoryStoreError::LockError)?;
        if rows.contains_key(&key) {
            return Err(MemoryStoreError::DuplicateKey(key));
        }
        let mut stored = entity.clone();
        stored.set_new(false);
        rows.insert(
            key.clone(),
            StoredRow {
                seq: self.next_seq(),
                entity: stored,
            },
        );
        info!(table = %self.name, %key, "Inserted row");
        Ok(())
    }

    fn merge(&self, entity: &E) -> Result<E> {
        self.calls.writes.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;

        let key = entity.primary_key();
        let mut rows = self.rows.write().map_err(|_| MemoryStoreError::LockError)?;
        let row = rows
            .get_mut(&key)
            .ok_or_else(|| MemoryStoreError::MissingRow(key.clone()))?;
        let mut stored = entity.clone();
        stored.set_new(false);
        row.entity = stored.clone();
        debug!(table = %self.name, %key, "Merged row");
        Ok(stored)
    }

    fn delete(&self, primary_key: &PrimaryKey) -> Result<Option<E>> {
        self.calls.writes.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;

        let mut rows = self.rows.write().map_err(|_| MemoryStoreError::LockError)?;
        let removed = rows.remove(primary_key).map(|row| row.entity);
        if removed.is_some() {
            info!(table = %self.name, key = %primary_key, "Removed row");
        }
        Ok(removed)
    }
}
