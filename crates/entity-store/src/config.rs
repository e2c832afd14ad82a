//! Store configuration loaded from `entity-store.toml`.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    num::NonZeroUsize,
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

const CONFIG_FILE: &str = "entity-store.toml";
const DEFAULT_ENTITY_CACHE_CAPACITY: usize = 10_000;
const DEFAULT_FINDER_CACHE_CAPACITY: usize = 1_000;

/// Top-level store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Entity cache settings.
    #[serde(default)]
    pub entity_cache: EntityCacheConfig,
    /// Finder cache settings.
    #[serde(default)]
    pub finder_cache: FinderCacheConfig,
    /// Invalidate list finders by changed columns instead of wholesale.
    #[serde(default = "enabled")]
    pub column_bitmask_enabled: bool,
    /// Logical → physical column name overrides.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            entity_cache: EntityCacheConfig::default(),
            finder_cache: FinderCacheConfig::default(),
            column_bitmask_enabled: true,
            columns: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    /// Load `entity-store.toml` from `dir`, falling back to defaults when absent.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, parsed or validated.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config_path = dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("failed to parse {}", config_path.display()))
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    /// Returns an error for malformed TOML or invalid settings.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot express.
    ///
    /// # Errors
    /// Returns an error for a zero cache capacity or empty/duplicate physical names.
    pub fn validate(&self) -> Result<()> {
        if self.entity_cache.enabled && self.entity_cache.capacity == 0 {
            bail!("entity_cache.capacity must be greater than zero");
        }
        if self.finder_cache.enabled && self.finder_cache.capacity == 0 {
            bail!("finder_cache.capacity must be greater than zero");
        }
        self.ensure_unique_physical_names()
    }

    fn ensure_unique_physical_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (logical, physical) in &self.columns {
            if physical.trim().is_empty() {
                bail!("physical name for column '{logical}' must not be empty");
            }
            if !seen.insert(physical.as_str()) {
                bail!("duplicate physical column name detected: {physical}");
            }
        }
        Ok(())
    }

    /// Entity cache capacity as a non-zero value.
    ///
    /// # Errors
    /// Returns an error when the configured capacity is zero.
    pub fn entity_cache_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.entity_cache.capacity)
            .ok_or_else(|| anyhow!("entity_cache.capacity must be greater than zero"))
    }

    /// Finder cache capacity per finder path as a non-zero value.
    ///
    /// # Errors
    /// Returns an error when the configured capacity is zero.
    pub fn finder_cache_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.finder_cache.capacity)
            .ok_or_else(|| anyhow!("finder_cache.capacity must be greater than zero"))
    }
}

const fn enabled() -> bool {
    true
}

const fn default_capacity() -> usize {
    DEFAULT_ENTITY_CACHE_CAPACITY
}

const fn default_finder_capacity() -> usize {
    DEFAULT_FINDER_CACHE_CAPACITY
}

/// `[entity_cache]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityCacheConfig {
    /// Serve primary-key lookups from memory.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Maximum number of cached keys.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for EntityCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_ENTITY_CACHE_CAPACITY,
        }
    }
}

/// `[finder_cache]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct FinderCacheConfig {
    /// Serve finder results from memory.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Maximum number of cached results per finder path.
    #[serde(default = "default_finder_capacity")]
    pub capacity: usize,
}

impl Default for FinderCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_FINDER_CACHE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("create temp dir");
        let config = StoreConfig::from_dir(dir.path()).expect("load config");
        assert!(config.entity_cache.enabled);
        assert_eq!(config.entity_cache.capacity, 10_000);
        assert!(config.finder_cache.enabled);
        assert_eq!(config.finder_cache.capacity, 1_000);
        assert!(config.column_bitmask_enabled);
        assert!(config.columns.is_empty());
    }

    #[test]
    fn loads_file_from_dir() {
        let dir = TempDir::new().expect("create temp dir");
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
column_bitmask_enabled = false

[entity_cache]
capacity = 64

[finder_cache]
enabled = false
capacity = 32

[columns]
uuid = "uuid_"
"#,
        )
        .expect("write config");

        let config = StoreConfig::from_dir(dir.path()).expect("load config");
        assert!(config.entity_cache.enabled);
        assert_eq!(config.entity_cache_capacity().unwrap().get(), 64);
        assert!(!config.finder_cache.enabled);
        assert_eq!(config.finder_cache_capacity().unwrap().get(), 32);
        assert!(!config.column_bitmask_enabled);
        assert_eq!(config.columns.get("uuid").map(String::as_str), Some("uuid_"));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = StoreConfig::from_toml_str("[entity_cache]\ncapacity = 0\n").unwrap_err();
        assert!(err.to_string().contains("capacity"));

        let disabled = StoreConfig::from_toml_str("[entity_cache]\nenabled = false\ncapacity = 0\n");
        assert!(disabled.is_ok());

        let finder = StoreConfig::from_toml_str("[finder_cache]\ncapacity = 0\n").unwrap_err();
        assert!(finder.to_string().contains("finder_cache.capacity"));
    }

    #[test]
    fn rejects_bad_physical_names() {
        let duplicate = StoreConfig::from_toml_str("[columns]\na = \"x\"\nb = \"x\"\n").unwrap_err();
        assert!(duplicate.to_string().contains("duplicate physical column name"));

        let empty = StoreConfig::from_toml_str("[columns]\na = \" \"\n").unwrap_err();
        assert!(empty.to_string().contains("must not be empty"));
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let dir = TempDir::new().expect("create temp dir");
        fs::write(dir.path().join(CONFIG_FILE), "entity_cache = 3").expect("write config");
        let err = StoreConfig::from_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains(CONFIG_FILE));
    }
}
