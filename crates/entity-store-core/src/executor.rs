use crate::entity::Entity;
use crate::id::PrimaryKey;
use crate::query::{Predicate, Query};

/// Backing store for one entity type.
///
/// The executor owns SQL generation and I/O; the caching engine only hands it
/// [`Query`] descriptions and primary keys.
pub trait QueryExecutor<E: Entity>: Send + Sync {
    /// Error type returned by the executor.
    type Error: Into<anyhow::Error>;

    /// Rows matching the query, ordered and windowed as requested.
    /// Without an ordering, rows come back in storage order.
    ///
    /// # Errors
    /// Returns an error when the backing store fails.
    fn list(&self, query: &Query) -> Result<Vec<E>, Self::Error>;

    /// Number of rows matching the predicate.
    ///
    /// # Errors
    /// Returns an error when the backing store fails.
    fn count(&self, predicate: &Predicate) -> Result<u64, Self::Error>;

    /// Load one row by primary key.
    ///
    /// # Errors
    /// Returns an error when the backing store fails.
    fn get(&self, primary_key: &PrimaryKey) -> Result<Option<E>, Self::Error>;

    /// Load several rows by primary key; absent keys are skipped.
    ///
    /// # Errors
    /// Returns an error when the backing store fails.
    fn get_many(&self, primary_keys: &[PrimaryKey]) -> Result<Vec<E>, Self::Error> {
        let mut rows = Vec::with_capacity(primary_keys.len());
        for key in primary_keys {
            if let Some(row) = self.get(key)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Persist a new row.
    ///
    /// # Errors
    /// Returns an error when the row exists or the backing store fails.
    fn insert(&self, entity: &E) -> Result<(), Self::Error>;

    /// Overwrite an existing row and return the stored state.
    ///
    /// # Errors
    /// Returns an error when the row is missing or the backing store fails.
    fn merge(&self, entity: &E) -> Result<E, Self::Error>;

    /// Delete a row, returning it when it existed.
    ///
    /// # Errors
    /// Returns an error when the backing store fails.
    fn delete(&self, primary_key: &PrimaryKey) -> Result<Option<E>, Self::Error>;
}
