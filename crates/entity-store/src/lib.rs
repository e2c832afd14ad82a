//! Finder-cache entity store.
//!
//! Serves primary-key lookups and finder queries from two in-memory caches
//! and keeps them coherent with the writes that flow through the store.

pub mod async_store;
pub mod config;
pub mod entity_cache;
pub mod error;
pub mod finder_cache;
pub mod finder_path;
pub mod friendly_url;
pub mod invalidator;
pub mod store;

// Re-exports for convenience
pub use async_store::AsyncEntityStore;
pub use config::{EntityCacheConfig, FinderCacheConfig, StoreConfig};
pub use entity_cache::{CacheStats, EntityCache, EntityLookup};
pub use error::StoreError;
pub use finder_cache::{CacheEvent, CacheListener, CachedResult, FinderCache, FinderKey};
pub use finder_path::{CacheNamespace, Finder, FinderDescriptor, FinderPath, FinderRegistry, PathKind};
pub use friendly_url::{FriendlyUrlEntry, FriendlyUrlEntryStore};
pub use invalidator::{CacheInvalidator, Change};
pub use store::{
    CacheMode, CompanyProvider, EntityConfig, EntityStore, FinderQuery, FixedCompany, PrevAndNext,
    StoreStats, WriteContext,
};

pub use entity_store_core::{
    Audit, Entity, OrderByComparator, Predicate, PrimaryKey, Query, QueryExecutor, Schema, Value,
    Window,
};
