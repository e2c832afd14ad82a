use crate::id::PrimaryKey;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Audit columns the store stamps on every write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    /// Secondary identifier, filled on first write when empty.
    pub uuid: String,
    /// Owning tenant.
    pub company_id: i64,
    /// Set once, when the entity is first persisted.
    #[serde(with = "time::serde::rfc3339::option")]
    pub create_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    modified_date: Option<OffsetDateTime>,
    #[serde(skip)]
    modified_date_set: bool,
}

impl Audit {
    /// Last modification timestamp.
    #[must_use]
    pub const fn modified_date(&self) -> Option<OffsetDateTime> {
        self.modified_date
    }

    /// Set the modification timestamp explicitly; the next write keeps it.
    pub const fn set_modified_date(&mut self, at: OffsetDateTime) {
        self.modified_date = Some(at);
        self.modified_date_set = true;
    }

    /// Stamp the modification timestamp without marking it as caller-supplied.
    pub const fn stamp_modified_date(&mut self, at: OffsetDateTime) {
        self.modified_date = Some(at);
    }

    /// Whether the caller set the modification timestamp since the last write.
    #[must_use]
    pub const fn has_set_modified_date(&self) -> bool {
        self.modified_date_set
    }

    /// Forget a caller-supplied modification timestamp once it was persisted.
    pub const fn reset_modified_date_flag(&mut self) {
        self.modified_date_set = false;
    }
}

/// A persistable record with typed columns.
///
/// Implementations expose every schema column through [`Entity::column`] so
/// predicates, comparators and the invalidator can work on any entity type.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Build an unpersisted entity carrying `primary_key`.
    fn with_primary_key(primary_key: PrimaryKey) -> Self;

    /// Primary key of this entity.
    fn primary_key(&self) -> PrimaryKey;

    /// True until the entity is first persisted.
    fn is_new(&self) -> bool;

    /// Update the "new" flag.
    fn set_new(&mut self, new: bool);

    /// Audit columns.
    fn audit(&self) -> &Audit;

    /// Mutable audit columns.
    fn audit_mut(&mut self) -> &mut Audit;

    /// Read a column by logical name. Unknown columns read as [`Value::Null`].
    fn column(&self, name: &str) -> Value;
}
