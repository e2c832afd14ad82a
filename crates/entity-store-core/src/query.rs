use crate::entity::Entity;
use crate::order::OrderByComparator;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// Equality condition on one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Condition {
    column: String,
    physical_name: String,
    value: Value,
}

impl Condition {
    /// Condition `column = value` rendered against `physical_name`.
    pub fn new(column: impl Into<String>, physical_name: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            physical_name: physical_name.into(),
            value,
        }
    }

    /// Logical column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Physical column name.
    #[must_use]
    pub fn physical_name(&self) -> &str {
        &self.physical_name
    }

    /// Argument value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Evaluate the condition against an entity.
    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        entity.column(&self.column).matches_arg(&self.value)
    }

    /// Whether the condition binds a positional parameter.
    #[must_use]
    pub fn binds_value(&self) -> bool {
        !self.value.is_blank()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = &self.physical_name;
        match &self.value {
            Value::Null => write!(f, "{column} IS NULL"),
            value if value.is_blank() => write!(f, "({column} IS NULL OR {column} = '')"),
            _ => write!(f, "{column} = ?"),
        }
    }
}

/// Conjunction of equality conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Predicate matching every row.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Add a condition.
    #[must_use]
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Conditions in argument order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns true when the predicate has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate every condition against an entity.
    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        self.conditions.iter().all(|condition| condition.matches(entity))
    }

    /// Positional parameters, skipping `NULL` and blank arguments.
    pub fn bound_values(&self) -> impl Iterator<Item = &Value> {
        self.conditions
            .iter()
            .filter(|condition| condition.binds_value())
            .map(Condition::value)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, condition) in self.conditions.iter().enumerate() {
            f.write_str(if i == 0 { "WHERE " } else { " AND " })?;
            condition.fmt(f)?;
        }
        Ok(())
    }
}

/// Slice of a result list: everything, or rows `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Window {
    /// No pagination.
    #[default]
    All,
    /// Rows `start..end` of the ordered result.
    Range {
        /// First row, inclusive.
        start: usize,
        /// Last row, exclusive.
        end: usize,
    },
}

impl Window {
    /// Rows `start..end`.
    #[must_use]
    pub const fn range(start: usize, end: usize) -> Self {
        Self::Range { start, end }
    }

    /// Returns true for [`Window::All`].
    #[must_use]
    pub const fn is_all(self) -> bool {
        matches!(self, Self::All)
    }

    /// Number of rows the window admits, if bounded.
    #[must_use]
    pub const fn limit(self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Range { start, end } => Some(end.saturating_sub(start)),
        }
    }

    /// Cut an ordered list down to the window.
    #[must_use]
    pub fn apply<T>(self, rows: Vec<T>) -> Vec<T> {
        match self {
            Self::All => rows,
            Self::Range { start, end } => rows
                .into_iter()
                .skip(start)
                .take(end.saturating_sub(start))
                .collect(),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::Range { start, end } => write!(f, "[{start}, {end})"),
        }
    }
}

/// Keyset anchor: admits only rows strictly after `anchor` under the query
/// ordering. Rows tied with the anchor on every ordering column are excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Seek {
    anchor: Vec<Value>,
}

impl Seek {
    /// Seek past the given ordering values.
    #[must_use]
    pub const fn after(anchor: Vec<Value>) -> Self {
        Self { anchor }
    }

    /// Anchor values, one per ordering term.
    #[must_use]
    pub fn anchor(&self) -> &[Value] {
        &self.anchor
    }

    /// Whether `entity` lies strictly after the anchor under `order`.
    pub fn admits<E: Entity>(&self, order: &OrderByComparator, entity: &E) -> bool {
        order.compare_to_anchor(entity, &self.anchor) == Ordering::Greater
    }
}

/// Query handed to a [`crate::QueryExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    predicate: Predicate,
    order: Option<OrderByComparator>,
    window: Window,
    seek: Option<Seek>,
}

impl Query {
    /// Unordered, unpaginated query over `table`.
    pub fn new(table: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            table: table.into(),
            predicate,
            order: None,
            window: Window::All,
            seek: None,
        }
    }

    /// Set the ordering.
    #[must_use]
    pub fn with_order(mut self, order: Option<OrderByComparator>) -> Self {
        self.order = order;
        self
    }

    /// Set the window.
    #[must_use]
    pub const fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    /// Set a keyset anchor.
    #[must_use]
    pub fn with_seek(mut self, seek: Seek) -> Self {
        self.seek = Some(seek);
        self
    }

    /// Table name used for rendering.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Filter.
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Ordering, if any.
    #[must_use]
    pub const fn order(&self) -> Option<&OrderByComparator> {
        self.order.as_ref()
    }

    /// Window.
    #[must_use]
    pub const fn window(&self) -> Window {
        self.window
    }

    /// Keyset anchor, if any.
    #[must_use]
    pub const fn seek(&self) -> Option<&Seek> {
        self.seek.as_ref()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT * FROM {}", self.table)?;
        if !self.predicate.is_empty() {
            write!(f, " {}", self.predicate)?;
        }
        if let (Some(seek), Some(order)) = (&self.seek, &self.order) {
            let keyword = if self.predicate.is_empty() { "WHERE" } else { "AND" };
            let columns: Vec<&str> = order.fields().iter().map(|field| field.physical_name()).collect();
            let marks = vec!["?"; seek.anchor().len()].join(", ");
            write!(f, " {keyword} ({}) AFTER ({marks})", columns.join(", "))?;
        }
        if let Some(order) = self.order.as_ref().filter(|order| !order.is_empty()) {
            write!(f, " ORDER BY {order}")?;
        }
        if let Window::Range { start, end } = self.window {
            write!(f, " LIMIT {} OFFSET {start}", end.saturating_sub(start))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::entity::testing::Row;

    fn by_title(value: Value) -> Predicate {
        Predicate::all().and(Condition::new("title", "title_", value))
    }

    #[test]
    fn predicate_applies_blank_rules() {
        let blank = by_title(Value::from(""));
        assert!(blank.matches(&Row::new(1, 1, None)));
        assert!(blank.matches(&Row::new(1, 1, Some(""))));
        assert!(!blank.matches(&Row::new(1, 1, Some("x"))));
        assert_eq!(blank.bound_values().count(), 0);

        let exact = by_title(Value::from("x")).and(Condition::new("groupId", "groupId", 1_i64.into()));
        assert!(exact.matches(&Row::new(1, 1, Some("x"))));
        assert!(!exact.matches(&Row::new(1, 2, Some("x"))));
        assert_eq!(exact.bound_values().count(), 2);
    }

    #[test]
    fn window_slices_and_tolerates_overrun() {
        let rows: Vec<u32> = (0..5).collect();
        assert_eq!(Window::range(1, 3).apply(rows.clone()), vec![1, 2]);
        assert_eq!(Window::range(4, 10).apply(rows.clone()), vec![4]);
        assert!(Window::range(3, 2).apply(rows.clone()).is_empty());
        assert_eq!(Window::All.apply(rows), vec![0, 1, 2, 3, 4]);
        assert_eq!(Window::range(2, 7).limit(), Some(5));
    }

    #[test]
    fn seek_excludes_rows_tied_with_anchor() {
        let order = OrderByComparator::asc("groupId");
        let seek = Seek::after(vec![Value::from(10_i64)]);
        assert!(!seek.admits(&order, &Row::new(1, 10, None)));
        assert!(seek.admits(&order, &Row::new(2, 11, None)));
        assert!(!seek.admits(&order.reversed(), &Row::new(2, 11, None)));
    }

    #[test]
    fn renders_physical_names() {
        let query = Query::new("FriendlyURLEntry", by_title(Value::Null))
            .with_order(Some(OrderByComparator::asc("groupId")))
            .with_window(Window::range(0, 1));
        assert_eq!(
            query.to_string(),
            "SELECT * FROM FriendlyURLEntry WHERE title_ IS NULL ORDER BY groupId ASC LIMIT 1 OFFSET 0"
        );

        let blank = Query::new("T", by_title(Value::from("")));
        assert_eq!(blank.to_string(), "SELECT * FROM T WHERE (title_ IS NULL OR title_ = '')");
    }
}
