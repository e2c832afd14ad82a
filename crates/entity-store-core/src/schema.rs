use crate::entity::Entity;
use std::collections::HashMap;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use thiserror::Error;

/// Maximum number of columns a schema can track in a [`ColumnMask`].
pub const MAX_COLUMNS: usize = 64;

/// Bit set over the columns of a [`Schema`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColumnMask(u64);

impl ColumnMask {
    /// No columns.
    pub const EMPTY: Self = Self(0);
    /// Every column, including ones added later.
    pub const ALL: Self = Self(u64::MAX);

    /// Mask with the single bit at `index` set.
    ///
    /// Indices past [`MAX_COLUMNS`] yield an empty mask.
    #[must_use]
    pub const fn bit(index: usize) -> Self {
        if index < MAX_COLUMNS {
            Self(1 << index)
        } else {
            Self::EMPTY
        }
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns true when no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true when both masks share at least one column.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ColumnMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ColumnMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ColumnMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// One column of an entity schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    name: String,
    physical_name: String,
    mask: ColumnMask,
}

impl Column {
    /// Logical column name, as entities expose it.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column name used when rendering queries against the backing store.
    #[must_use]
    pub fn physical_name(&self) -> &str {
        &self.physical_name
    }

    /// Bit assigned to this column.
    #[must_use]
    pub const fn mask(&self) -> ColumnMask {
        self.mask
    }
}

/// Errors raised while describing a schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The column is not part of the schema.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    /// The same logical name appears twice.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    /// More columns than a [`ColumnMask`] can address.
    #[error("a schema holds at most {max} columns, got {actual}")]
    TooManyColumns {
        /// Supported maximum.
        max: usize,
        /// Columns declared.
        actual: usize,
    },
}

/// Ordered column list of one entity type.
#[derive(Clone, Debug)]
pub struct Schema {
    entity_name: String,
    primary_key: String,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Describe an entity with the given columns; physical names default to
    /// the logical ones.
    ///
    /// # Errors
    /// Returns [`SchemaError`] for duplicate columns, more than
    /// [`MAX_COLUMNS`] columns, or a primary key column that is not listed.
    pub fn new(
        entity_name: impl Into<String>,
        primary_key: &str,
        columns: &[&str],
    ) -> Result<Self, SchemaError> {
        if columns.len() > MAX_COLUMNS {
            return Err(SchemaError::TooManyColumns {
                max: MAX_COLUMNS,
                actual: columns.len(),
            });
        }

        let mut index = HashMap::with_capacity(columns.len());
        let mut described = Vec::with_capacity(columns.len());
        for (position, name) in columns.iter().enumerate() {
            if index.insert((*name).to_owned(), position).is_some() {
                return Err(SchemaError::DuplicateColumn((*name).to_owned()));
            }
            described.push(Column {
                name: (*name).to_owned(),
                physical_name: (*name).to_owned(),
                mask: ColumnMask::bit(position),
            });
        }

        if !index.contains_key(primary_key) {
            return Err(SchemaError::UnknownColumn(primary_key.to_owned()));
        }

        Ok(Self {
            entity_name: entity_name.into(),
            primary_key: primary_key.to_owned(),
            columns: described,
            index,
        })
    }

    /// Apply logical → physical column name overrides.
    ///
    /// # Errors
    /// Returns [`SchemaError::UnknownColumn`] when a mapping names a column
    /// the schema does not have.
    pub fn with_physical_names<'a, I>(mut self, mapping: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (logical, physical) in mapping {
            let position = *self
                .index
                .get(logical)
                .ok_or_else(|| SchemaError::UnknownColumn(logical.to_owned()))?;
            if let Some(column) = self.columns.get_mut(position) {
                physical.clone_into(&mut column.physical_name);
            }
        }
        Ok(self)
    }

    /// Entity name used in messages.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Logical name of the primary key column.
    #[must_use]
    pub fn primary_key_column(&self) -> &str {
        &self.primary_key
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by logical name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).and_then(|&i| self.columns.get(i))
    }

    /// Physical name of `name`, or `name` itself when it is not a column.
    #[must_use]
    pub fn physical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.column(name).map_or(name, Column::physical_name)
    }

    /// Union of the bits of the named columns.
    ///
    /// # Errors
    /// Returns [`SchemaError::UnknownColumn`] for names outside the schema.
    pub fn mask_of<'a, I>(&self, names: I) -> Result<ColumnMask, SchemaError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().try_fold(ColumnMask::EMPTY, |mask, name| {
            self.column(name)
                .map(|column| mask | column.mask())
                .ok_or_else(|| SchemaError::UnknownColumn(name.to_owned()))
        })
    }

    /// Mask of the columns whose values differ between two snapshots.
    #[must_use]
    pub fn changed_columns<E: Entity>(&self, before: &E, after: &E) -> ColumnMask {
        self.columns
            .iter()
            .filter(|column| before.column(column.name()) != after.column(column.name()))
            .fold(ColumnMask::EMPTY, |mask, column| mask | column.mask())
    }
}
