use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Typed column value.
///
/// Values are totally ordered (variants are ranked first, then compared by
/// payload) and hashable so they can take part in cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Boolean column.
    Bool(bool),
    /// Integer column.
    Long(i64),
    /// String column.
    Text(String),
    /// Timestamp column in UTC.
    Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
}

impl Value {
    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Long(_) => 2,
            Self::Text(_) => 3,
            Self::Timestamp(_) => 4,
        }
    }

    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for `NULL` or an empty string.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Integer payload, if any.
    #[must_use]
    pub const fn as_long(&self) -> Option<i64> {
        if let Self::Long(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Boolean payload, if any.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// String payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Self::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Timestamp payload, if any.
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<OffsetDateTime> {
        if let Self::Timestamp(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Whether a column holding `self` satisfies an equality condition on `arg`.
    ///
    /// A `NULL` argument only matches `NULL`; an empty string matches `NULL`
    /// or the empty string; everything else compares by equality.
    #[must_use]
    pub fn matches_arg(&self, arg: &Self) -> bool {
        match arg {
            Self::Null => self.is_null(),
            Self::Text(text) if text.is_empty() => self.is_blank(),
            _ => self == arg,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => value.fmt(f),
            Self::Long(value) => value.fmt(f),
            Self::Text(value) => f.write_str(value),
            Self::Timestamp(value) => match value.format(&Rfc3339) {
                Ok(formatted) => f.write_str(&formatted),
                Err(_) => value.fmt(f),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Long(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
