use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{convert::Infallible, fmt, str::FromStr};
use uuid::Uuid;

/// Primary key of a persisted entity (integer or string surrogate key).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum PrimaryKey {
    /// Numeric surrogate key.
    Long(i64),
    /// String surrogate key.
    Text(String),
}

impl PrimaryKey {
    /// Column value carrying the same key.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Long(key) => Value::Long(*key),
            Self::Text(key) => Value::Text(key.clone()),
        }
    }

    /// Numeric key, if any.
    #[must_use]
    pub const fn as_long(&self) -> Option<i64> {
        if let Self::Long(key) = self {
            Some(*key)
        } else {
            None
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long(key) => key.fmt(f),
            Self::Text(key) => f.write_str(key),
        }
    }
}

impl FromStr for PrimaryKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>()
            .map_or_else(|_| Self::Text(s.to_owned()), Self::Long))
    }
}

impl From<i64> for PrimaryKey {
    fn from(key: i64) -> Self {
        Self::Long(key)
    }
}

impl From<&str> for PrimaryKey {
    fn from(key: &str) -> Self {
        Self::Text(key.to_owned())
    }
}

impl From<String> for PrimaryKey {
    fn from(key: String) -> Self {
        Self::Text(key)
    }
}

impl From<PrimaryKey> for Value {
    fn from(key: PrimaryKey) -> Self {
        match key {
            PrimaryKey::Long(key) => Self::Long(key),
            PrimaryKey::Text(key) => Self::Text(key),
        }
    }
}

impl Serialize for PrimaryKey {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Long(key) => s.serialize_i64(*key),
            Self::Text(key) => s.serialize_str(key),
        }
    }
}

impl<'de> Deserialize<'de> for PrimaryKey {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Long(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(d)? {
            Raw::Long(key) => Self::Long(key),
            Raw::Text(key) => Self::Text(key),
        })
    }
}

/// Generate a fresh secondary identifier for the `uuid` audit column.
#[must_use]
pub fn new_uuid() -> String {
    // UUID version 7 keeps identifiers roughly ordered by creation time.
    Uuid::now_v7().to_string()
}
