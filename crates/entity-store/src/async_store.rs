//! Async facade running store operations on the blocking thread pool.

use crate::error::StoreError;
use crate::store::{EntityStore, FinderQuery, PrevAndNext, StoreStats, WriteContext};
use entity_store_core::{Entity, PrimaryKey, QueryExecutor};
use std::sync::Arc;

/// Shares one [`EntityStore`] with async callers.
///
/// Executors are synchronous, so every call moves to
/// [`tokio::task::spawn_blocking`] to keep the runtime responsive.
pub struct AsyncEntityStore<E: Entity, X: QueryExecutor<E> + 'static> {
    inner: Arc<EntityStore<E, X>>,
}

impl<E: Entity, X: QueryExecutor<E> + 'static> Clone for AsyncEntityStore<E, X> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity, X: QueryExecutor<E> + 'static> AsyncEntityStore<E, X> {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: EntityStore<E, X>) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Shared synchronous store.
    #[must_use]
    pub const fn inner(&self) -> &Arc<EntityStore<E, X>> {
        &self.inner
    }

    async fn run<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&EntityStore<E, X>) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || operation(&store)).await?
    }

    /// See [`EntityStore::find`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn find(&self, query: FinderQuery) -> Result<Vec<E>, StoreError> {
        self.run(move |store| store.find(&query)).await
    }

    /// See [`EntityStore::count`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn count(&self, query: FinderQuery) -> Result<u64, StoreError> {
        self.run(move |store| store.count(&query)).await
    }

    /// See [`EntityStore::fetch_first`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn fetch_first(&self, query: FinderQuery) -> Result<Option<E>, StoreError> {
        self.run(move |store| store.fetch_first(&query)).await
    }

    /// See [`EntityStore::fetch_last`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn fetch_last(&self, query: FinderQuery) -> Result<Option<E>, StoreError> {
        self.run(move |store| store.fetch_last(&query)).await
    }

    /// See [`EntityStore::find_prev_and_next`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn find_prev_and_next(
        &self,
        primary_key: PrimaryKey,
        query: FinderQuery,
    ) -> Result<PrevAndNext<E>, StoreError> {
        self.run(move |store| store.find_prev_and_next(&primary_key, &query))
            .await
    }

    /// See [`EntityStore::fetch_unique`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn fetch_unique(&self, query: FinderQuery) -> Result<Option<E>, StoreError> {
        self.run(move |store| store.fetch_unique(&query)).await
    }

    /// See [`EntityStore::find_unique`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn find_unique(&self, query: FinderQuery) -> Result<E, StoreError> {
        self.run(move |store| store.find_unique(&query)).await
    }

    /// See [`EntityStore::fetch_by_primary_key`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn fetch_by_primary_key(&self, primary_key: PrimaryKey) -> Result<Option<E>, StoreError> {
        self.run(move |store| store.fetch_by_primary_key(&primary_key))
            .await
    }

    /// See [`EntityStore::find_by_primary_key`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn find_by_primary_key(&self, primary_key: PrimaryKey) -> Result<E, StoreError> {
        self.run(move |store| store.find_by_primary_key(&primary_key))
            .await
    }

    /// See [`EntityStore::update`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn update(&self, entity: E) -> Result<E, StoreError> {
        self.run(move |store| store.update(entity)).await
    }

    /// See [`EntityStore::update_with`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn update_with(&self, entity: E, context: WriteContext) -> Result<E, StoreError> {
        self.run(move |store| store.update_with(entity, &context))
            .await
    }

    /// See [`EntityStore::remove`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn remove(&self, primary_key: PrimaryKey) -> Result<E, StoreError> {
        self.run(move |store| store.remove(&primary_key)).await
    }

    /// See [`EntityStore::remove_by`].
    ///
    /// # Errors
    /// Returns the store error, or [`StoreError::Join`] if the task panicked.
    pub async fn remove_by(&self, query: FinderQuery) -> Result<usize, StoreError> {
        self.run(move |store| store.remove_by(&query)).await
    }

    /// Cache counters; never blocks on the executor.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.inner.stats()
    }
}
