//! Finder descriptors and the per-entity registry of cache paths.

use crate::error::StoreError;
use entity_store_core::{ColumnMask, Condition, Entity, Predicate, Schema, Value};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Cache namespace a finder path stores its results in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Single-entity results of unique finders.
    Entity,
    /// Windowed or ordered list results.
    Paginated,
    /// Full, unordered list results and counts.
    Unpaginated,
}

/// Shape of the query a finder path caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// Unique lookup.
    Fetch,
    /// Windowed or ordered list.
    WithPagination,
    /// Full list.
    WithoutPagination,
    /// Row count.
    Count,
}

/// One cacheable query shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinderPath {
    name: String,
    kind: PathKind,
    namespace: CacheNamespace,
    mask: ColumnMask,
}

impl FinderPath {
    fn new(prefix: &str, finder: &str, kind: PathKind, mask: ColumnMask) -> Self {
        let namespace = match kind {
            PathKind::Fetch => CacheNamespace::Entity,
            PathKind::WithPagination => CacheNamespace::Paginated,
            PathKind::WithoutPagination | PathKind::Count => CacheNamespace::Unpaginated,
        };
        let mask = if kind == PathKind::WithPagination {
            ColumnMask::ALL
        } else {
            mask
        };
        Self {
            name: format!("{prefix}{finder}"),
            kind,
            namespace,
            mask,
        }
    }

    /// Method-style name, such as `fetchByG_L_U` or `countByUuid`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query shape.
    #[must_use]
    pub const fn kind(&self) -> PathKind {
        self.kind
    }

    /// Namespace holding this path's entries.
    #[must_use]
    pub const fn namespace(&self) -> CacheNamespace {
        self.namespace
    }

    /// Columns whose changes can affect this path's results.
    #[must_use]
    pub const fn mask(&self) -> ColumnMask {
        self.mask
    }
}

/// Declarative description of one logical finder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinderDescriptor {
    name: String,
    columns: Vec<String>,
    unique: bool,
}

impl FinderDescriptor {
    /// Finder returning at most one entity.
    pub fn unique(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::build(name, columns, true)
    }

    /// Finder returning a list.
    pub fn non_unique(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::build(name, columns, false)
    }

    fn build(name: impl Into<String>, columns: &[&str], unique: bool) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|column| (*column).to_owned()).collect(),
            unique,
        }
    }
}

#[derive(Clone, Debug)]
enum Paths {
    Unique {
        fetch: FinderPath,
        count: FinderPath,
    },
    NonUnique {
        with_pagination: FinderPath,
        without_pagination: FinderPath,
        count: FinderPath,
    },
}

/// A registered finder with its resolved columns and cache paths.
#[derive(Clone, Debug)]
pub struct Finder {
    name: String,
    columns: Vec<String>,
    physical_names: Vec<String>,
    mask: ColumnMask,
    paths: Paths,
}

impl Finder {
    fn resolve(schema: &Schema, descriptor: &FinderDescriptor) -> Result<Self, StoreError> {
        let mask = schema.mask_of(descriptor.columns.iter().map(String::as_str))?;
        let physical_names = descriptor
            .columns
            .iter()
            .map(|column| schema.physical_name(column).to_owned())
            .collect();
        let name = descriptor.name.as_str();
        let paths = if descriptor.unique {
            Paths::Unique {
                fetch: FinderPath::new("fetchBy", name, PathKind::Fetch, mask),
                count: FinderPath::new("countBy", name, PathKind::Count, mask),
            }
        } else {
            Paths::NonUnique {
                with_pagination: FinderPath::new("findBy", name, PathKind::WithPagination, mask),
                without_pagination: FinderPath::new("findBy", name, PathKind::WithoutPagination, mask),
                count: FinderPath::new("countBy", name, PathKind::Count, mask),
            }
        };
        Ok(Self {
            name: descriptor.name.clone(),
            columns: descriptor.columns.clone(),
            physical_names,
            mask,
            paths,
        })
    }

    /// Logical finder name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument columns in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns true for unique finders.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        matches!(self.paths, Paths::Unique { .. })
    }

    /// Columns the WHERE clause touches.
    #[must_use]
    pub const fn mask(&self) -> ColumnMask {
        self.mask
    }

    /// `FETCH` path of a unique finder.
    #[must_use]
    pub const fn fetch_path(&self) -> Option<&FinderPath> {
        match &self.paths {
            Paths::Unique { fetch, .. } => Some(fetch),
            Paths::NonUnique { .. } => None,
        }
    }

    /// `WITH_PAGINATION` path of a non-unique finder.
    #[must_use]
    pub const fn with_pagination_path(&self) -> Option<&FinderPath> {
        match &self.paths {
            Paths::NonUnique {
                with_pagination, ..
            } => Some(with_pagination),
            Paths::Unique { .. } => None,
        }
    }

    /// `WITHOUT_PAGINATION` path of a non-unique finder.
    #[must_use]
    pub const fn without_pagination_path(&self) -> Option<&FinderPath> {
        match &self.paths {
            Paths::NonUnique {
                without_pagination,
                ..
            } => Some(without_pagination),
            Paths::Unique { .. } => None,
        }
    }

    /// `COUNT` path.
    #[must_use]
    pub const fn count_path(&self) -> &FinderPath {
        match &self.paths {
            Paths::Unique { count, .. } | Paths::NonUnique { count, .. } => count,
        }
    }

    /// Reject argument tuples that do not match the finder columns.
    ///
    /// # Errors
    /// Returns [`StoreError::ArgumentCount`] on a length mismatch.
    pub fn check_args(&self, args: &[Value]) -> Result<(), StoreError> {
        if args.len() == self.columns.len() {
            Ok(())
        } else {
            Err(StoreError::ArgumentCount {
                finder: self.name.clone(),
                expected: self.columns.len(),
                actual: args.len(),
            })
        }
    }

    /// Argument tuple that would select `entity`.
    pub fn args_of<E: Entity>(&self, entity: &E) -> Vec<Value> {
        self.columns.iter().map(|column| entity.column(column)).collect()
    }

    /// WHERE clause for an argument tuple.
    #[must_use]
    pub fn predicate(&self, args: &[Value]) -> Predicate {
        self.columns
            .iter()
            .zip(&self.physical_names)
            .zip(args)
            .fold(Predicate::all(), |predicate, ((column, physical), value)| {
                predicate.and(Condition::new(column.clone(), physical.clone(), value.clone()))
            })
    }

    /// Render arguments as `column=value` pairs for messages.
    #[must_use]
    pub fn describe_args(&self, args: &[Value]) -> String {
        let mut out = String::new();
        for (i, (column, value)) in self.columns.iter().zip(args).enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{column}={value}");
        }
        out
    }
}

/// Every finder of one entity type, built once at store construction.
#[derive(Clone, Debug)]
pub struct FinderRegistry {
    finders: Vec<Finder>,
    index: HashMap<String, usize>,
}

impl FinderRegistry {
    /// Name of the built-in finder matching every row.
    pub const ALL: &'static str = "All";

    /// Resolve descriptors against the schema and register the `All` finder.
    ///
    /// # Errors
    /// Returns [`StoreError::Schema`] for unknown columns and
    /// [`StoreError::DuplicateFinder`] for repeated names.
    pub fn build(schema: &Schema, descriptors: &[FinderDescriptor]) -> Result<Self, StoreError> {
        let all = FinderDescriptor::non_unique(Self::ALL, &[]);
        let mut finders = Vec::with_capacity(descriptors.len() + 1);
        let mut index = HashMap::with_capacity(descriptors.len() + 1);
        for descriptor in std::iter::once(&all).chain(descriptors) {
            if index.insert(descriptor.name.clone(), finders.len()).is_some() {
                return Err(StoreError::DuplicateFinder(descriptor.name.clone()));
            }
            finders.push(Finder::resolve(schema, descriptor)?);
        }
        Ok(Self { finders, index })
    }

    /// Look up a finder by name.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownFinder`] when no such finder exists.
    pub fn get(&self, name: &str) -> Result<&Finder, StoreError> {
        self.index
            .get(name)
            .and_then(|&i| self.finders.get(i))
            .ok_or_else(|| StoreError::UnknownFinder(name.to_owned()))
    }

    /// Every registered finder, `All` first.
    pub fn finders(&self) -> impl Iterator<Item = &Finder> {
        self.finders.iter()
    }

    /// Unique finders.
    pub fn unique_finders(&self) -> impl Iterator<Item = &Finder> {
        self.finders.iter().filter(|finder| finder.is_unique())
    }

    /// Non-unique finders, `All` included.
    pub fn list_finders(&self) -> impl Iterator<Item = &Finder> {
        self.finders.iter().filter(|finder| !finder.is_unique())
    }
}
