//! Error types for entity store operations.

use entity_store_core::SchemaError;
use thiserror::Error;

/// Errors raised by [`crate::EntityStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A throwing finder found no matching entity.
    #[error("No {entity} exists with the key {{{args}}}")]
    EntityNotFound {
        /// Entity name.
        entity: String,
        /// Finder that was queried.
        finder: String,
        /// Rendered `column=value` arguments.
        args: String,
    },

    /// The backing store failed; nothing was cached.
    #[error("{operation} failed: {source}")]
    Execution {
        /// Finder path or write operation that failed.
        operation: String,
        /// Executor error.
        #[source]
        source: anyhow::Error,
    },

    /// No finder with this name is registered.
    #[error("unknown finder '{0}'")]
    UnknownFinder(String),

    /// A finder was registered twice.
    #[error("finder '{0}' is registered more than once")]
    DuplicateFinder(String),

    /// Arguments do not line up with the finder columns.
    #[error("finder '{finder}' takes {expected} arguments, got {actual}")]
    ArgumentCount {
        /// Finder name.
        finder: String,
        /// Number of finder columns.
        expected: usize,
        /// Number of arguments supplied.
        actual: usize,
    },

    /// A unique lookup was requested on a non-unique finder.
    #[error("finder '{0}' is not unique")]
    NotUnique(String),

    /// A list lookup was requested on a unique finder.
    #[error("finder '{0}' is unique and has no list form")]
    UniqueFinder(String),

    /// Entity description is inconsistent.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Store configuration is invalid.
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),

    /// A blocking task did not complete.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub(crate) fn execution(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Execution {
            operation: operation.into(),
            source: source.into(),
        }
    }
}
