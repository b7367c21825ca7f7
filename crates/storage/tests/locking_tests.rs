//! Cross-thread locking behavior of MemoryStore transactions.

use nomen_core::{Record, RecordStore, SeriesKey};
use nomen_storage::{LockingMode, MemoryStore};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn counter(name: &str) -> nomen_core::CounterKey {
    SeriesKey::from_raw(name).counter_key()
}

// ============================================================================
// Counter Rows
// ============================================================================

#[test]
fn test_strict_mode_locks_absent_row() {
    let store = Arc::new(MemoryStore::with_mode(LockingMode::Strict));
    let mut holder = store.begin().unwrap();
    assert_eq!(holder.lock_counter(&counter("A")).unwrap(), None);

    let (tx, rx) = mpsc::channel();
    let other = Arc::clone(&store);
    let waiter = thread::spawn(move || {
        let mut txn = other.begin().unwrap();
        let seen = txn.lock_counter(&counter("A")).unwrap();
        tx.send(seen).unwrap();
        txn.commit().unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    holder.insert_counter(&counter("A"), 1).unwrap();
    holder.commit().unwrap();

    // The waiter observes the committed row, never "absent".
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Some(1));
    waiter.join().unwrap();
}

#[test]
fn test_existing_rows_only_reports_duplicate_after_winner_commits() {
    let store = Arc::new(MemoryStore::with_mode(LockingMode::ExistingRowsOnly));
    let mut winner = store.begin().unwrap();
    assert_eq!(winner.lock_counter(&counter("A")).unwrap(), None);
    winner.insert_counter(&counter("A"), 1).unwrap();

    let (tx, rx) = mpsc::channel();
    let other = Arc::clone(&store);
    let loser = thread::spawn(move || {
        let mut txn = other.begin().unwrap();
        // Both sides see "absent" under this mode.
        assert_eq!(txn.lock_counter(&counter("A")).unwrap(), None);
        let insert = txn.insert_counter(&counter("A"), 1);
        tx.send(insert.map_err(|e| e.is_duplicate_key())).unwrap();
        let relocked = txn.lock_counter(&counter("A")).unwrap();
        txn.rollback().unwrap();
        relocked
    });

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    winner.commit().unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Err(true));
    assert_eq!(loser.join().unwrap(), Some(1));
    assert_eq!(store.held_locks(), 0);
}

// ============================================================================
// Record Writes
// ============================================================================

#[test]
fn test_record_writers_serialize() {
    let store = Arc::new(MemoryStore::new());
    store.create_table("Customer", ["customer_name"]);

    let mut first = store.begin().unwrap();
    first
        .insert_record(&"Customer".into(), Record::new("C-1"))
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let other = Arc::clone(&store);
    let second = thread::spawn(move || {
        let mut txn = other.begin().unwrap();
        txn.insert_record(&"Customer".into(), Record::new("C-2"))
            .unwrap();
        txn.commit().unwrap();
        tx.send(()).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    first.commit().unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    second.join().unwrap();

    // The second writer started from the first writer's committed tables.
    let ids: Vec<_> = store
        .records("Customer")
        .into_iter()
        .map(|r| r.identifier)
        .collect();
    assert_eq!(ids, ["C-1", "C-2"]);
}

#[test]
fn test_table_lock_reader_sees_prior_writer() {
    let store = Arc::new(MemoryStore::new());
    store.create_table("Customer", ["customer_name"]);

    let mut first = store.begin().unwrap();
    first.lock_table(&"Customer".into()).unwrap();

    let (tx, rx) = mpsc::channel();
    let other = Arc::clone(&store);
    let second = thread::spawn(move || {
        let mut txn = other.begin().unwrap();
        txn.lock_table(&"Customer".into()).unwrap();
        let seen = txn.list_page(&"Customer".into(), None, 10).unwrap().len();
        txn.rollback().unwrap();
        tx.send(seen).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    first
        .insert_record(&"Customer".into(), Record::new("C-1"))
        .unwrap();
    first.commit().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    second.join().unwrap();
}

#[test]
fn test_lock_unknown_table_fails() {
    let store = MemoryStore::new();
    let mut txn = store.begin().unwrap();
    assert!(txn.lock_table(&"Lead".into()).is_err());
}

#[test]
fn test_counter_locks_do_not_block_record_writes() {
    let store = Arc::new(MemoryStore::new());
    store.create_table("Customer", ["customer_name"]);

    let mut holder = store.begin().unwrap();
    holder.lock_counter(&counter("A")).unwrap();

    let other = Arc::clone(&store);
    let writer = thread::spawn(move || {
        let mut txn = other.begin().unwrap();
        txn.insert_record(&"Customer".into(), Record::new("C-1"))
            .unwrap();
        txn.commit().unwrap();
    });
    writer.join().unwrap();
    holder.commit().unwrap();
    assert!(store.get("Customer", "C-1").is_some());
}
