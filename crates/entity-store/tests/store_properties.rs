#![allow(missing_docs, clippy::unwrap_used)]

use anyhow::Result;
use entity_store::friendly_url::{self, FriendlyUrlEntry, finder};
use entity_store::{
    Entity, EntityStore, FinderQuery, FriendlyUrlEntryStore, OrderByComparator, Predicate,
    PrimaryKey, Query, QueryExecutor, StoreConfig, StoreError, WriteContext,
};
use entity_store_memory::{MemoryStoreError, MemoryTable};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use time::macros::datetime;

type Table = MemoryTable<FriendlyUrlEntry>;
type Store = FriendlyUrlEntryStore<Table>;

fn setup_with(config: &StoreConfig) -> Result<(Arc<Table>, Store)> {
    let table = Arc::new(MemoryTable::new(friendly_url::TABLE));
    let store = EntityStore::new(Arc::clone(&table), friendly_url::entity_config()?, config)?;
    Ok((table, FriendlyUrlEntryStore::new(store)))
}

fn setup() -> Result<(Arc<Table>, Store)> {
    setup_with(&StoreConfig::default())
}

fn draft(store: &Store, id: i64, group_id: i64, title: &str) -> FriendlyUrlEntry {
    let mut entry = store.create(PrimaryKey::from(id));
    entry.group_id = group_id;
    entry.language_id = "en_US".into();
    entry.url_title = title.into();
    entry
}

fn save(store: &Store, id: i64, group_id: i64, title: &str) -> Result<FriendlyUrlEntry> {
    Ok(store.update(draft(store, id, group_id, title))?)
}

fn ids(entries: &[FriendlyUrlEntry]) -> Vec<i64> {
    entries.iter().map(|entry| entry.entry_id).collect()
}

#[test]
fn fetch_after_update_agrees_with_saved_entity() -> Result<()> {
    let (table, store) = setup()?;
    let saved = save(&store, 1, 10, "foo")?;
    assert!(!saved.is_new());
    assert!(!saved.audit.uuid.is_empty());
    assert!(saved.audit.create_date.is_some());

    assert_eq!(store.fetch_by_primary_key(&PrimaryKey::from(1))?, Some(saved.clone()));

    let uncached = store.executor().get(&PrimaryKey::from(1))?;
    assert_eq!(uncached, Some(saved));
    assert_eq!(table.len(), 1);
    Ok(())
}

#[test]
fn unique_finder_follows_url_title_change() -> Result<()> {
    let (_table, store) = setup()?;
    let mut entry = draft(&store, 1, 10, "foo");
    entry.main = true;
    let saved = store.update(entry)?;

    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "foo")?, Some(saved.clone()));

    let mut renamed = saved;
    renamed.url_title = "bar".into();
    let renamed = store.update(renamed)?;

    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "foo")?, None);
    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "bar")?, Some(renamed));
    assert_eq!(store.count_by_g_l_u(10, "en_US", "foo")?, 0);
    Ok(())
}

#[test]
fn every_unique_finder_drops_old_values() -> Result<()> {
    let (_table, store) = setup()?;
    let saved = save(&store, 1, 10, "foo")?;
    let old_uuid = saved.audit.uuid.clone();
    assert!(store.fetch_by_uuid_g(&old_uuid, 10)?.is_some());

    let mut moved = saved;
    moved.group_id = 11;
    moved.audit.uuid = "replacement".into();
    let moved = store.update(moved)?;

    assert_eq!(store.fetch_by_uuid_g(&old_uuid, 10)?, None);
    assert_eq!(store.fetch_by_uuid_g("replacement", 11)?, Some(moved.clone()));
    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "foo")?, None);
    assert_eq!(store.fetch_by_g_l_u(11, "en_US", "foo")?, Some(moved));
    Ok(())
}

#[test]
fn find_all_is_sorted_by_primary_key_and_stable() -> Result<()> {
    let (table, store) = setup()?;
    for (id, title) in [(5, "e"), (2, "b"), (9, "z"), (1, "a")] {
        save(&store, id, 10, title)?;
    }

    let first = store.find_all()?;
    let lists = table.call_stats().lists;
    let second = store.find_all()?;

    assert_eq!(ids(&first), vec![1, 2, 5, 9]);
    assert_eq!(first, second);
    assert_eq!(table.call_stats().lists, lists, "second call is served from cache");
    Ok(())
}

#[test]
fn paginated_queries_use_default_then_caller_order() -> Result<()> {
    let (_table, store) = setup()?;
    for (id, title) in [(1, "delta"), (2, "alpha"), (3, "charlie"), (4, "bravo")] {
        save(&store, id, 10, title)?;
    }

    let page = store.find(&FinderQuery::all().range(0, 2))?;
    assert_eq!(ids(&page), vec![2, 4]);

    let by_id_desc = store.find(&FinderQuery::all().order_by(OrderByComparator::desc("entryId")).range(1, 3))?;
    assert_eq!(ids(&by_id_desc), vec![3, 2]);

    assert_eq!(store.fetch_first(&FinderQuery::all())?.map(|e| e.entry_id), Some(2));
    assert_eq!(store.fetch_last(&FinderQuery::all())?.map(|e| e.entry_id), Some(1));
    Ok(())
}

#[test]
fn prev_and_next_breaks_ties_on_second_field() -> Result<()> {
    let (_table, store) = setup()?;
    let earlier = WriteContext {
        create_date: Some(datetime!(2024-01-01 0:00 UTC)),
        modified_date: None,
    };
    let later = WriteContext {
        create_date: Some(datetime!(2024-06-01 0:00 UTC)),
        modified_date: None,
    };
    store.update_with(draft(&store, 1, 10, "old"), &earlier)?;
    store.update_with(draft(&store, 2, 10, "new"), &later)?;
    store.update_with(draft(&store, 3, 5, "first"), &later)?;

    let query = FinderQuery::all().order_by(OrderByComparator::asc("groupId").then_desc("createDate"));
    let around = store.find_prev_and_next(&PrimaryKey::from(1), &query)?;

    assert_eq!(around.current.entry_id, 1);
    assert_eq!(around.previous.map(|e| e.entry_id), Some(2));
    assert!(around.next.is_none());

    let around_first = store.find_prev_and_next(&PrimaryKey::from(3), &query)?;
    assert!(around_first.previous.is_none());
    assert_eq!(around_first.next.map(|e| e.entry_id), Some(2));
    Ok(())
}

#[test]
fn remove_evicts_entity_and_every_finder() -> Result<()> {
    let (_table, store) = setup()?;
    let saved = save(&store, 1, 10, "foo")?;
    let uuid = saved.audit.uuid.clone();
    assert_eq!(store.find_by_uuid(&uuid)?.len(), 1);
    assert!(store.fetch_by_g_l_u(10, "en_US", "foo")?.is_some());

    store.remove(&PrimaryKey::from(1))?;

    assert_eq!(store.fetch_by_primary_key(&PrimaryKey::from(1))?, None);
    assert!(store.find_by_uuid(&uuid)?.is_empty());
    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "foo")?, None);
    assert_eq!(store.fetch_by_uuid_g(&uuid, 10)?, None);
    assert!(store.find_all()?.is_empty());

    let err = store.remove(&PrimaryKey::from(1)).unwrap_err();
    assert!(matches!(err, StoreError::EntityNotFound { .. }));
    Ok(())
}

#[test]
fn count_by_uuid_tracks_writes() -> Result<()> {
    let (_table, store) = setup()?;
    assert_eq!(store.count_by_uuid("x")?, 0);

    for id in 1..=3 {
        let mut entry = draft(&store, id, id, "shared");
        entry.audit.uuid = "x".into();
        store.update(entry)?;
    }
    assert_eq!(store.count_by_uuid("x")?, 3);

    store.remove(&PrimaryKey::from(2))?;
    assert_eq!(store.count_by_uuid("x")?, 2);
    assert_eq!(ids(&store.find_by_uuid("x")?), vec![1, 3]);
    Ok(())
}

#[test]
fn duplicate_unique_rows_pick_greatest_primary_key() -> Result<()> {
    let (table, store) = setup()?;
    for id in [4, 7, 2] {
        let mut entry = draft(&store, id, 10, "dup");
        entry.set_new(false);
        table.insert(&entry)?;
    }

    let picked = store.fetch_by_g_l_u(10, "en_US", "dup")?;
    assert_eq!(picked.map(|e| e.entry_id), Some(7));
    Ok(())
}

#[test]
fn executor_failure_is_not_cached() -> Result<()> {
    let (table, store) = setup()?;
    save(&store, 1, 10, "foo")?;

    table.fail_next_call("disk on fire");
    let err = store.find_by_uuid("missing").unwrap_err();
    assert!(matches!(err, StoreError::Execution { .. }));
    assert!(err.to_string().contains("disk on fire"));

    assert!(store.find_by_uuid("missing")?.is_empty());
    Ok(())
}

#[test]
fn bypass_skips_lookup_but_refreshes_cache() -> Result<()> {
    let (table, store) = setup()?;
    save(&store, 1, 10, "foo")?;
    assert_eq!(store.count_all()?, 1);

    let mut outside = draft(&store, 2, 10, "bar");
    outside.set_new(false);
    table.insert(&outside)?;
    assert_eq!(store.count_all()?, 1, "cached count is stale until bypassed");

    assert_eq!(store.count(&FinderQuery::all().bypass_cache())?, 2);
    assert_eq!(store.count_all()?, 2);
    Ok(())
}

#[test]
fn disabled_caches_always_reach_the_executor() -> Result<()> {
    let mut config = StoreConfig::default();
    config.entity_cache.enabled = false;
    config.finder_cache.enabled = false;
    let (table, store) = setup_with(&config)?;
    save(&store, 1, 10, "foo")?;

    let before = table.call_stats();
    store.fetch_by_primary_key(&PrimaryKey::from(1))?;
    store.fetch_by_primary_key(&PrimaryKey::from(1))?;
    store.fetch_by_g_l_u(10, "en_US", "foo")?;
    store.fetch_by_g_l_u(10, "en_US", "foo")?;
    let after = table.call_stats();

    assert_eq!(after.gets - before.gets, 2);
    assert_eq!(after.lists - before.lists, 2);
    assert_eq!(store.stats().entity_cache.hits, 0);
    Ok(())
}

#[test]
fn bulk_fetch_remembers_absent_keys() -> Result<()> {
    let (table, store) = setup()?;
    save(&store, 1, 10, "a")?;
    save(&store, 2, 10, "b")?;
    store.clear_cache();

    let keys = [PrimaryKey::from(1), PrimaryKey::from(2), PrimaryKey::from(3)];
    let found = store.fetch_by_primary_keys(&keys)?;
    assert_eq!(found.len(), 2);
    assert!(!found.contains_key(&PrimaryKey::from(3)));

    let gets = table.call_stats().gets;
    let again = store.fetch_by_primary_keys(&keys)?;
    assert_eq!(again.len(), 2);
    assert_eq!(table.call_stats().gets, gets);
    Ok(())
}

#[test]
fn remove_by_finder_removes_every_match() -> Result<()> {
    let (_table, store) = setup()?;
    for id in 1..=3 {
        let mut entry = draft(&store, id, 10, &format!("t{id}"));
        entry.audit.uuid = "batch".into();
        store.update(entry)?;
    }
    save(&store, 4, 10, "other")?;

    let removed = store.remove_by(&FinderQuery::new(finder::UUID).arg("batch"))?;
    assert_eq!(removed, 3);
    assert_eq!(ids(&store.find_all()?), vec![4]);
    Ok(())
}

#[test]
fn misuse_is_reported() -> Result<()> {
    let (_table, store) = setup()?;
    let unknown = store.find(&FinderQuery::new("Nope")).unwrap_err();
    assert!(matches!(unknown, StoreError::UnknownFinder(_)));

    let arity = store.find(&FinderQuery::new(finder::UUID)).unwrap_err();
    assert!(matches!(arity, StoreError::ArgumentCount { expected: 1, actual: 0, .. }));

    let not_unique = store.fetch_unique(&FinderQuery::new(finder::UUID).arg("x")).unwrap_err();
    assert!(matches!(not_unique, StoreError::NotUnique(_)));

    let unique = store
        .find(&FinderQuery::new(finder::G_L_U).arg(1_i64).arg("en_US").arg("x"))
        .unwrap_err();
    assert!(matches!(unique, StoreError::UniqueFinder(_)));
    Ok(())
}

#[test]
fn explicit_modified_date_survives_update() -> Result<()> {
    let (_table, store) = setup()?;
    let saved = save(&store, 1, 10, "foo")?;
    let created = saved.audit.create_date;

    let mut edited = saved;
    edited.audit.set_modified_date(datetime!(2020-02-02 2:00 UTC));
    let edited = store.update(edited)?;
    assert_eq!(edited.audit.modified_date(), Some(datetime!(2020-02-02 2:00 UTC)));
    assert_eq!(edited.audit.create_date, created);
    assert!(!edited.audit.has_set_modified_date());

    let stamped = store.update(edited)?;
    assert_ne!(stamped.audit.modified_date(), Some(datetime!(2020-02-02 2:00 UTC)));
    Ok(())
}

#[test]
fn clear_cache_for_entity_drops_lists_and_unique_entries() -> Result<()> {
    let (table, store) = setup()?;
    let saved = save(&store, 1, 10, "foo")?;
    store.find_all()?;
    store.fetch_by_g_l_u(10, "en_US", "foo")?;

    store.clear_cache_for(&saved);
    let lists = table.call_stats().lists;
    store.fetch_by_g_l_u(10, "en_US", "foo")?;
    store.find_all()?;
    assert_eq!(table.call_stats().lists, lists + 2);
    Ok(())
}

#[test]
fn concurrent_writers_never_leave_stale_unique_entries() -> Result<()> {
    let (_table, store) = setup()?;
    for id in 1..=4 {
        save(&store, id, id, "v0")?;
    }

    thread::scope(|scope| {
        for id in 1..=4_i64 {
            let store = &store;
            scope.spawn(move || {
                for round in 1..=25 {
                    let mut entry = store.find_by_primary_key(&PrimaryKey::from(id)).unwrap();
                    let previous = entry.url_title.clone();
                    entry.url_title = format!("v{round}");
                    store.update(entry).unwrap();

                    assert_eq!(store.fetch_by_g_l_u(id, "en_US", &previous).unwrap(), None);
                    let current = store.fetch_by_g_l_u(id, "en_US", &format!("v{round}")).unwrap();
                    assert_eq!(current.map(|e| e.entry_id), Some(id));
                }
            });
            scope.spawn(move || {
                for _ in 0..50 {
                    let _ = store.find_all().unwrap();
                    let _ = store.count_all().unwrap();
                }
            });
        }
    });

    for id in 1..=4 {
        let entry = store.find_by_primary_key(&PrimaryKey::from(id))?;
        assert_eq!(entry.url_title, "v25");
    }
    assert_eq!(store.count_all()?, 4);
    Ok(())
}

#[test]
fn loaded_duplicates_do_not_pin_unique_count() -> Result<()> {
    let (table, store) = setup()?;
    for id in [4, 7, 2] {
        let mut entry = draft(&store, id, 10, "dup");
        entry.set_new(false);
        table.insert(&entry)?;
    }

    assert!(store.fetch_by_g_l_u(10, "en_US", "dup")?.is_some());
    assert_eq!(store.count_by_g_l_u(10, "en_US", "dup")?, 3);
    Ok(())
}

#[test]
fn stale_unique_mapping_is_reloaded() -> Result<()> {
    let (table, store) = setup()?;
    let saved = save(&store, 1, 10, "foo")?;
    assert!(store.fetch_by_g_l_u(10, "en_US", "foo")?.is_some());

    let mut renamed = saved;
    renamed.url_title = "bar".into();
    table.merge(&renamed)?;
    store.cache_result(&renamed);

    let lists = table.call_stats().lists;
    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "foo")?, None);
    assert_eq!(table.call_stats().lists, lists + 1);
    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "bar")?, Some(renamed));
    Ok(())
}

#[test]
fn stale_cached_list_is_reloaded() -> Result<()> {
    let (table, store) = setup()?;
    let mut entry = draft(&store, 1, 10, "foo");
    entry.audit.uuid = "x".into();
    let saved = store.update(entry)?;
    assert_eq!(ids(&store.find_by_uuid("x")?), vec![1]);

    let mut moved = saved;
    moved.audit.uuid = "y".into();
    table.merge(&moved)?;
    store.cache_result(&moved);

    let lists = table.call_stats().lists;
    assert!(store.find_by_uuid("x")?.is_empty());
    assert_eq!(table.call_stats().lists, lists + 1);
    Ok(())
}

#[test]
fn failed_list_resolution_evicts_finder_entry() -> Result<()> {
    let mut config = StoreConfig::default();
    config.entity_cache.enabled = false;
    let (table, store) = setup_with(&config)?;
    let mut entry = draft(&store, 1, 10, "foo");
    entry.audit.uuid = "x".into();
    store.update(entry)?;
    assert_eq!(store.find_by_uuid("x")?.len(), 1);

    table.fail_next_call("lost connection");
    let err = store.find_by_uuid("x").unwrap_err();
    assert!(matches!(err, StoreError::Execution { .. }));

    let lists = table.call_stats().lists;
    assert_eq!(ids(&store.find_by_uuid("x")?), vec![1]);
    assert_eq!(table.call_stats().lists, lists + 1, "finder entry was evicted");
    Ok(())
}

/// Executor that stalls after merging one particular title until a second
/// writer has started.
struct StallingTable {
    inner: Table,
    stall_title: &'static str,
    started: Barrier,
}

impl QueryExecutor<FriendlyUrlEntry> for StallingTable {
    type Error = MemoryStoreError;

    fn list(&self, query: &Query) -> Result<Vec<FriendlyUrlEntry>, MemoryStoreError> {
        self.inner.list(query)
    }

    fn count(&self, predicate: &Predicate) -> Result<u64, MemoryStoreError> {
        self.inner.count(predicate)
    }

    fn get(&self, primary_key: &PrimaryKey) -> Result<Option<FriendlyUrlEntry>, MemoryStoreError> {
        self.inner.get(primary_key)
    }

    fn insert(&self, entity: &FriendlyUrlEntry) -> Result<(), MemoryStoreError> {
        self.inner.insert(entity)
    }

    fn merge(&self, entity: &FriendlyUrlEntry) -> Result<FriendlyUrlEntry, MemoryStoreError> {
        let stored = self.inner.merge(entity)?;
        if entity.url_title == self.stall_title {
            self.started.wait();
            thread::sleep(Duration::from_millis(100));
        }
        Ok(stored)
    }

    fn delete(&self, primary_key: &PrimaryKey) -> Result<Option<FriendlyUrlEntry>, MemoryStoreError> {
        self.inner.delete(primary_key)
    }
}

#[test]
fn overlapping_updates_leave_cache_in_store_order() -> Result<()> {
    let table = Arc::new(StallingTable {
        inner: MemoryTable::new(friendly_url::TABLE),
        stall_title: "slow",
        started: Barrier::new(2),
    });
    let store = FriendlyUrlEntryStore::new(EntityStore::new(
        Arc::clone(&table),
        friendly_url::entity_config()?,
        &StoreConfig::default(),
    )?);
    let mut entry = store.create(PrimaryKey::from(1));
    entry.group_id = 10;
    entry.language_id = "en_US".into();
    entry.url_title = "v0".into();
    let saved = store.update(entry)?;

    thread::scope(|scope| {
        let store = &store;
        let table = &table;
        let mut slow = saved.clone();
        slow.url_title = "slow".into();
        scope.spawn(move || store.update(slow).unwrap());
        scope.spawn(move || {
            table.started.wait();
            let mut fast = saved;
            fast.url_title = "fast".into();
            store.update(fast).unwrap();
        });
    });

    let stored = table.inner.get(&PrimaryKey::from(1))?.unwrap();
    let cached = store.find_by_primary_key(&PrimaryKey::from(1))?;
    assert_eq!(cached.url_title, stored.url_title);
    assert_eq!(cached.url_title, "fast");
    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "slow")?, None);
    assert_eq!(store.fetch_by_g_l_u(10, "en_US", "fast")?.map(|e| e.entry_id), Some(1));
    Ok(())
}
