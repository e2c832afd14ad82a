//! Domain vocabulary shared by the entity store engine and its backends.

/// Entity trait and audit columns.
pub mod entity;
/// Backing store boundary.
pub mod executor;
/// Primary keys and secondary identifiers.
pub mod id;
/// Caller-supplied orderings.
pub mod order;
/// Predicates, windows and queries.
pub mod query;
/// Column lists and bitmasks.
pub mod schema;
/// Typed column values.
pub mod value;

pub use entity::{Audit, Entity};
pub use executor::QueryExecutor;
pub use id::{PrimaryKey, new_uuid};
pub use order::{OrderByComparator, OrderField};
pub use query::{Condition, Predicate, Query, Seek, Window};
pub use schema::{Column, ColumnMask, MAX_COLUMNS, Schema, SchemaError};
pub use value::Value;
