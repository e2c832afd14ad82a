use crate::entity::Entity;
use crate::schema::Schema;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderField {
    column: String,
    physical_name: Option<String>,
    ascending: bool,
}

impl OrderField {
    /// Logical column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Column name for rendered queries.
    #[must_use]
    pub fn physical_name(&self) -> &str {
        self.physical_name.as_deref().unwrap_or(&self.column)
    }

    /// Sort direction.
    #[must_use]
    pub const fn is_ascending(&self) -> bool {
        self.ascending
    }
}

/// Caller-supplied ordering over entity columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OrderByComparator {
    fields: Vec<OrderField>,
}

impl OrderByComparator {
    /// Ordering with a single ascending column.
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self::default().then_asc(column)
    }

    /// Ordering with a single descending column.
    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self::default().then_desc(column)
    }

    /// Append an ascending tie-breaker.
    #[must_use]
    pub fn then_asc(self, column: impl Into<String>) -> Self {
        self.then(column, true)
    }

    /// Append a descending tie-breaker.
    #[must_use]
    pub fn then_desc(self, column: impl Into<String>) -> Self {
        self.then(column, false)
    }

    fn then(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.fields.push(OrderField {
            column: column.into(),
            physical_name: None,
            ascending,
        });
        self
    }

    /// Terms in priority order.
    #[must_use]
    pub fn fields(&self) -> &[OrderField] {
        &self.fields
    }

    /// Returns true when there is nothing to sort by.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Same terms with every direction flipped.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|field| OrderField {
                    ascending: !field.ascending,
                    ..field.clone()
                })
                .collect(),
        }
    }

    /// Attach the schema's physical column names for rendering.
    #[must_use]
    pub fn resolved(&self, schema: &Schema) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|field| OrderField {
                    physical_name: Some(schema.physical_name(&field.column).to_owned()),
                    ..field.clone()
                })
                .collect(),
        }
    }

    /// Compare two entities; the first differing term decides.
    pub fn compare<E: Entity>(&self, a: &E, b: &E) -> Ordering {
        self.fields
            .iter()
            .map(|field| directed(field, a.column(&field.column).cmp(&b.column(&field.column))))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Values of the ordering columns, in term order.
    pub fn anchor_values<E: Entity>(&self, entity: &E) -> Vec<Value> {
        self.fields
            .iter()
            .map(|field| entity.column(&field.column))
            .collect()
    }

    /// Compare an entity against values captured by [`Self::anchor_values`].
    pub fn compare_to_anchor<E: Entity>(&self, entity: &E, anchor: &[Value]) -> Ordering {
        self.fields
            .iter()
            .zip(anchor)
            .map(|(field, value)| directed(field, entity.column(&field.column).cmp(value)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

const fn directed(field: &OrderField, ordering: Ordering) -> Ordering {
    if field.ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

impl fmt::Display for OrderByComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let direction = if field.ascending { "ASC" } else { "DESC" };
            write!(f, "{} {direction}", field.physical_name())?;
        }
        Ok(())
    }
}
