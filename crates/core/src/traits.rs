//! Core traits for storage, lookup, and schema discovery
//!
//! These traits are the seams between the naming core and whatever system
//! hosts it. The engine only sees:
//! - [`RecordStore`] / [`Transaction`]: persisted rows and counters
//! - [`GroupDirectory`]: owning-group abbreviation lookup
//! - [`ReferenceCatalog`]: fields across the schema that reference a type
//!
//! Thread safety: stores, directories, and catalogs are shared across
//! threads (`Send + Sync`). A transaction handle belongs to one caller.

use crate::error::Result;
use crate::reference::{DirectReference, PolymorphicReference, RowFilter};
use crate::types::{CounterKey, EntityType, Record};

/// Persisted store of records and series counters
///
/// All reads and writes happen through a transaction obtained from
/// [`RecordStore::begin`]. Dropping a transaction without committing rolls it
/// back.
pub trait RecordStore: Send + Sync {
    /// Begin a unit of work
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot open a transaction.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>>;
}

/// Transaction-scoped handle on a [`RecordStore`]
///
/// Locks taken through this handle are held until [`Transaction::commit`] or
/// [`Transaction::rollback`]. Writes are visible to this handle immediately
/// and to other handles only after commit.
pub trait Transaction {
    /// Lock the counter row exclusively and read its value
    ///
    /// Blocks while another transaction holds the row. Returns `None` when the
    /// row does not exist. Whether an absent row is locked depends on the
    /// store; callers must handle [`Error::DuplicateKey`](crate::Error) from a
    /// subsequent insert.
    fn lock_counter(&mut self, key: &CounterKey) -> Result<Option<i64>>;

    /// Insert a new counter row
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the row exists (possibly inserted by a
    /// concurrent transaction that has since committed).
    fn insert_counter(&mut self, key: &CounterKey, value: i64) -> Result<()>;

    /// Overwrite a counter row previously locked by this transaction
    fn write_counter(&mut self, key: &CounterKey, value: i64) -> Result<()>;

    /// Lock `table` against other writers until this transaction ends
    ///
    /// Reads made afterwards see every write committed before the lock was
    /// granted, so a check-then-insert on the table cannot race another
    /// writer. A store may lock more than the one table. Take it before any
    /// counter lock.
    fn lock_table(&mut self, table: &EntityType) -> Result<()>;

    /// Read up to `limit` records of `table` with identifiers strictly after
    /// `after`, ordered by identifier ascending
    fn list_page(
        &mut self,
        table: &EntityType,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>>;

    /// All identifiers of `table` starting with `prefix`
    fn identifiers_with_prefix(&mut self, table: &EntityType, prefix: &str)
        -> Result<Vec<String>>;

    /// First record matching the filter, by identifier order
    fn find_first(&mut self, filter: &RowFilter) -> Result<Option<Record>>;

    /// Number of records matching the filter
    fn count_matching(&mut self, filter: &RowFilter) -> Result<usize>;

    /// Set `field = value` on every record matching the filter
    ///
    /// Returns the number of updated records.
    fn update_matching(&mut self, filter: &RowFilter, field: &str, value: &str) -> Result<usize>;

    /// Insert a new record
    fn insert_record(&mut self, table: &EntityType, record: Record) -> Result<()>;

    /// Change a record's primary key
    ///
    /// The store also fixes up any linkage it manages internally (e.g. child
    /// rows keyed by their parent). References held in ordinary fields are not
    /// touched.
    fn rename_record(&mut self, table: &EntityType, old_id: &str, new_id: &str) -> Result<()>;

    /// Publish all writes and release all locks
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard all writes and release all locks
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Lookup of owning groups (companies) and their abbreviations
pub trait GroupDirectory: Send + Sync {
    /// Group to use when an entity names none (e.g. the user's default)
    fn default_group(&self) -> Option<String>;

    /// Abbreviation of `group_id`, or `None` when the group is unknown
    fn abbreviation(&self, group_id: &str) -> Result<Option<String>>;
}

/// Discovery of reference fields across the live schema
///
/// Must be exhaustive: a reference field missing from the catalog is never
/// rewritten and ends up pointing at an identifier nobody holds.
pub trait ReferenceCatalog: Send + Sync {
    /// Direct reference fields whose target is `target`
    fn list_direct_references(&self, target: &EntityType) -> Result<Vec<DirectReference>>;

    /// Every polymorphic reference pair in the schema
    fn list_polymorphic_references(&self) -> Result<Vec<PolymorphicReference>>;
}
