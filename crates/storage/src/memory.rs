//! MemoryStore: in-memory RecordStore with row-level locking
//!
//! This module implements the `RecordStore` and `Transaction` traits using:
//! - `parking_lot::RwLock` around the committed tables and counter rows
//! - [`LockManager`] for blocking, transaction-scoped row locks
//! - A private copy-on-write working set per writing transaction
//!
//! # Isolation
//!
//! - **Counter rows**: locked individually. Writes stay private to the
//!   transaction until commit; the lock is held until commit or rollback.
//! - **Records**: the first record write takes the store-wide record-writer
//!   lock and clones the committed tables into a working copy. Commit swaps
//!   the working copy in. Readers that have not written see committed data.
//!
//! # Locking Modes
//!
//! [`LockingMode::Strict`] locks a counter row even when it does not exist
//! yet, so two allocators can never both observe "absent".
//! [`LockingMode::ExistingRowsOnly`] only locks rows that exist, like a
//! row-lock engine without gap locks: two callers may both observe "absent",
//! and the loser's insert blocks on the winner's row lock and then reports
//! `DuplicateKey`.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use nomen_core::{
    CounterKey, EntityType, Error, Record, RecordStore, Result, RowFilter, SeriesKey, Transaction,
};

use crate::lock::{LockManager, LockResource, TxnId};
use crate::table::{ChildLink, Table, Tables};

/// How absent counter rows are locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockingMode {
    /// Absent rows are locked too (no duplicate-insert race)
    #[default]
    Strict,
    /// Only existing rows are locked (duplicate-insert race possible)
    ExistingRowsOnly,
}

/// In-memory record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    counters: RwLock<BTreeMap<CounterKey, i64>>,
    locks: LockManager,
    next_txn: AtomicU64,
    mode: LockingMode,
}

impl MemoryStore {
    /// Create an empty store in [`LockingMode::Strict`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given locking mode
    pub fn with_mode(mode: LockingMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Locking mode in effect
    pub fn mode(&self) -> LockingMode {
        self.mode
    }

    /// Create (or replace) a table with declared fields
    pub fn create_table<I, S>(&self, name: impl Into<EntityType>, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.write().create_table(name.into(), Table::new(fields));
    }

    /// Register child-table linkage maintained on rename
    pub fn link_children(&self, link: ChildLink) {
        self.tables.write().link_children(link);
    }

    /// Insert a record outside any transaction
    pub fn insert(&self, table: impl Into<EntityType>, record: Record) -> Result<()> {
        let _writer = self.writer_guard();
        self.tables.write().insert(&table.into(), record)
    }

    /// Committed record, if present
    pub fn get(&self, table: impl Into<EntityType>, identifier: &str) -> Option<Record> {
        self.tables
            .read()
            .get(&table.into(), identifier)
            .ok()
            .flatten()
            .cloned()
    }

    /// All committed records of a table in identifier order
    pub fn records(&self, table: impl Into<EntityType>) -> Vec<Record> {
        self.tables
            .read()
            .table(&table.into())
            .map(|t| t.rows().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed counter value for a series
    pub fn counter(&self, series_key: &SeriesKey) -> Option<i64> {
        self.counters.read().get(&series_key.counter_key()).copied()
    }

    /// Set a committed counter value outside any transaction
    pub fn set_counter(&self, series_key: &SeriesKey, value: i64) {
        self.counters.write().insert(series_key.counter_key(), value);
    }

    /// Clone of all committed counters
    pub fn counters(&self) -> BTreeMap<CounterKey, i64> {
        self.counters.read().clone()
    }

    /// Run `f` against the committed tables
    pub fn with_tables<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.tables.read())
    }

    /// Number of row locks currently held (for tests and diagnostics)
    pub fn held_locks(&self) -> usize {
        self.locks.held_count()
    }

    fn allocate_txn_id(&self) -> TxnId {
        TxnId(self.next_txn.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Take the record-writer lock for a one-shot write outside a transaction
    fn writer_guard(&self) -> WriterGuard<'_> {
        let txn = self.allocate_txn_id();
        self.locks.acquire(&LockResource::RecordWriter, txn);
        WriterGuard { store: self, txn }
    }
}

struct WriterGuard<'a> {
    store: &'a MemoryStore,
    txn: TxnId,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.store
            .locks
            .release_all(self.txn, &[LockResource::RecordWriter]);
    }
}

impl RecordStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        let id = self.allocate_txn_id();
        debug!(target: "nomen::storage", txn = %id, "Transaction started");
        Ok(Box::new(MemoryTransaction {
            store: self,
            id,
            counter_writes: BTreeMap::new(),
            working: None,
            held: Vec::new(),
            active: true,
        }))
    }
}

/// Transaction handle on a [`MemoryStore`]
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    id: TxnId,
    counter_writes: BTreeMap<CounterKey, i64>,
    working: Option<Tables>,
    held: Vec<LockResource>,
    active: bool,
}

impl MemoryTransaction<'_> {
    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(Error::TransactionClosed)
        }
    }

    fn lock(&mut self, resource: LockResource) {
        if self.store.locks.acquire(&resource, self.id) {
            self.held.push(resource);
        }
    }

    fn committed_counter(&self, key: &CounterKey) -> Option<i64> {
        self.store.counters.read().get(key).copied()
    }

    fn visible_counter(&self, key: &CounterKey) -> Option<i64> {
        self.counter_writes
            .get(key)
            .copied()
            .or_else(|| self.committed_counter(key))
    }

    fn read_tables<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T> {
        match &self.working {
            Some(tables) => f(tables),
            None => f(&self.store.tables.read()),
        }
    }

    fn write_tables(&mut self) -> &mut Tables {
        if self.working.is_none() {
            self.lock(LockResource::RecordWriter);
            self.working = Some(self.store.tables.read().clone());
        }
        self.working.get_or_insert_with(Tables::new)
    }

    fn release(&mut self) {
        self.active = false;
        let held = std::mem::take(&mut self.held);
        self.store.locks.release_all(self.id, &held);
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn lock_counter(&mut self, key: &CounterKey) -> Result<Option<i64>> {
        self.ensure_active()?;
        let resource = LockResource::Counter(key.clone());
        match self.store.mode {
            LockingMode::Strict => self.lock(resource),
            LockingMode::ExistingRowsOnly => {
                let exists = self.counter_writes.contains_key(key)
                    || self.committed_counter(key).is_some();
                if !exists {
                    return Ok(None);
                }
                self.lock(resource);
            }
        }
        Ok(self.visible_counter(key))
    }

    fn insert_counter(&mut self, key: &CounterKey, value: i64) -> Result<()> {
        self.ensure_active()?;
        // Blocks on a concurrent inserter until it commits or rolls back.
        self.lock(LockResource::Counter(key.clone()));
        if self.visible_counter(key).is_some() {
            return Err(Error::DuplicateKey {
                table: "counters".to_string(),
                key: key.to_string(),
            });
        }
        self.counter_writes.insert(key.clone(), value);
        Ok(())
    }

    fn write_counter(&mut self, key: &CounterKey, value: i64) -> Result<()> {
        self.ensure_active()?;
        let resource = LockResource::Counter(key.clone());
        if !self.store.locks.is_held_by(&resource, self.id) {
            return Err(Error::Storage(format!(
                "counter {key} written without holding its lock"
            )));
        }
        self.counter_writes.insert(key.clone(), value);
        Ok(())
    }

    fn lock_table(&mut self, table: &EntityType) -> Result<()> {
        self.ensure_active()?;
        // One writer lock covers every table.
        self.write_tables().table(table)?;
        Ok(())
    }

    fn list_page(
        &mut self,
        table: &EntityType,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        self.ensure_active()?;
        self.read_tables(|t| t.list_page(table, after, limit))
    }

    fn identifiers_with_prefix(&mut self, table: &EntityType, prefix: &str) -> Result<Vec<String>> {
        self.ensure_active()?;
        self.read_tables(|t| t.identifiers_with_prefix(table, prefix))
    }

    fn find_first(&mut self, filter: &RowFilter) -> Result<Option<Record>> {
        self.ensure_active()?;
        self.read_tables(|t| t.find_first(filter))
    }

    fn count_matching(&mut self, filter: &RowFilter) -> Result<usize> {
        self.ensure_active()?;
        self.read_tables(|t| t.count_matching(filter))
    }

    fn update_matching(&mut self, filter: &RowFilter, field: &str, value: &str) -> Result<usize> {
        self.ensure_active()?;
        self.write_tables().update_matching(filter, field, value)
    }

    fn insert_record(&mut self, table: &EntityType, record: Record) -> Result<()> {
        self.ensure_active()?;
        self.write_tables().insert(table, record)
    }

    fn rename_record(&mut self, table: &EntityType, old_id: &str, new_id: &str) -> Result<()> {
        self.ensure_active()?;
        self.write_tables().rename(table, old_id, new_id)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.ensure_active()?;
        let counter_writes = std::mem::take(&mut self.counter_writes);
        let written = counter_writes.len();
        if !counter_writes.is_empty() {
            self.store.counters.write().extend(counter_writes);
        }
        let wrote_records = match self.working.take() {
            Some(tables) => {
                *self.store.tables.write() = tables;
                true
            }
            None => false,
        };
        debug!(
            target: "nomen::storage",
            txn = %self.id,
            counters = written,
            records = wrote_records,
            "Transaction committed"
        );
        self.release();
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.ensure_active()?;
        self.counter_writes.clear();
        self.working = None;
        debug!(target: "nomen::storage", txn = %self.id, "Transaction rolled back");
        self.release();
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.active {
            if !self.counter_writes.is_empty() || self.working.is_some() {
                warn!(target: "nomen::storage", txn = %self.id, "Transaction dropped without commit; discarding writes");
            }
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomen_core::SeriesKey;

    fn key(name: &str) -> CounterKey {
        SeriesKey::from_raw(name).counter_key()
    }

    fn store_with_customers() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("Customer", ["customer_name"]);
        store
            .insert("Customer", Record::new("C-1").with_field("customer_name", "Spar"))
            .unwrap();
        store
    }

    #[test]
    fn test_counter_write_is_private_until_commit() {
        let store = MemoryStore::new();
        let mut txn = store.begin().unwrap();
        assert_eq!(txn.lock_counter(&key("A")).unwrap(), None);
        txn.insert_counter(&key("A"), 1).unwrap();
        assert_eq!(txn.lock_counter(&key("A")).unwrap(), Some(1));
        assert_eq!(store.counter(&SeriesKey::from_raw("A")), None);

        txn.commit().unwrap();
        assert_eq!(store.counter(&SeriesKey::from_raw("A")), Some(1));
        assert_eq!(store.held_locks(), 0);
    }

    #[test]
    fn test_rollback_discards_counter_write() {
        let store = MemoryStore::new();
        store.set_counter(&SeriesKey::from_raw("A"), 5);

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.lock_counter(&key("A")).unwrap(), Some(5));
        txn.write_counter(&key("A"), 6).unwrap();
        txn.rollback().unwrap();

        assert_eq!(store.counter(&SeriesKey::from_raw("A")), Some(5));
        assert_eq!(store.held_locks(), 0);
    }

    #[test]
    fn test_drop_releases_locks() {
        let store = MemoryStore::new();
        {
            let mut txn = store.begin().unwrap();
            txn.lock_counter(&key("A")).unwrap();
            assert_eq!(store.held_locks(), 1);
        }
        assert_eq!(store.held_locks(), 0);
    }

    #[test]
    fn test_write_counter_requires_lock() {
        let store = MemoryStore::with_mode(LockingMode::ExistingRowsOnly);
        let mut txn = store.begin().unwrap();
        assert_eq!(txn.lock_counter(&key("A")).unwrap(), None);
        assert!(txn.write_counter(&key("A"), 1).is_err());
    }

    #[test]
    fn test_insert_counter_duplicate() {
        let store = MemoryStore::new();
        store.set_counter(&SeriesKey::from_raw("A"), 3);
        let mut txn = store.begin().unwrap();
        assert!(txn.insert_counter(&key("A"), 1).unwrap_err().is_duplicate_key());
    }

    #[test]
    fn test_record_writes_visible_after_commit_only() {
        let store = store_with_customers();
        let mut txn = store.begin().unwrap();
        txn.rename_record(&"Customer".into(), "C-1", "SPACO001").unwrap();

        let own = txn.list_page(&"Customer".into(), None, 10).unwrap();
        assert_eq!(own[0].identifier, "SPACO001");
        assert!(store.get("Customer", "C-1").is_some());

        txn.commit().unwrap();
        assert!(store.get("Customer", "C-1").is_none());
        assert!(store.get("Customer", "SPACO001").is_some());
    }

    #[test]
    fn test_record_rollback_restores_original() {
        let store = store_with_customers();
        let mut txn = store.begin().unwrap();
        txn.rename_record(&"Customer".into(), "C-1", "SPACO001").unwrap();
        txn.rollback().unwrap();
        assert!(store.get("Customer", "C-1").is_some());
        assert!(store.get("Customer", "SPACO001").is_none());
    }

    #[test]
    fn test_commit_releases_absent_row_lock() {
        let store = MemoryStore::new();
        let mut txn = store.begin().unwrap();
        txn.lock_counter(&key("A")).unwrap();
        assert_eq!(store.held_locks(), 1);
        txn.commit().unwrap();
        assert_eq!(store.held_locks(), 0);
        let mut next = store.begin().unwrap();
        assert_eq!(next.lock_counter(&key("A")).unwrap(), None);
    }
}
