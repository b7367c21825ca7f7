//! Multi-threaded sequence allocation tests
//!
//! Validates that concurrent allocators on one series never share a number,
//! in both locking modes, and that different series never wait on each other.

use nomen_core::{RecordStore, SeriesKey};
use nomen_engine::{EntityProfile, KeyDeriver, Naming, NamingContext, SequenceAllocator};
use nomen_storage::{LockingMode, MemoryStore, StaticGroupDirectory};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

fn series() -> SeriesKey {
    SeriesKey::from_raw("CUSTSPAACM")
}

fn allocate_concurrently(store: Arc<MemoryStore>) -> Vec<i64> {
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let alloc = SequenceAllocator::new();
                barrier.wait();
                let mut values = Vec::with_capacity(PER_THREAD);
                for _ in 0..PER_THREAD {
                    let mut txn = store.begin().unwrap();
                    let value = alloc.next_value(txn.as_mut(), &series(), 1).unwrap();
                    txn.commit().unwrap();
                    values.push(value);
                }
                values
            })
        })
        .collect();

    handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect()
}

fn assert_dense_and_unique(mut values: Vec<i64>) {
    let total = THREADS * PER_THREAD;
    let unique: HashSet<_> = values.iter().copied().collect();
    assert_eq!(unique.len(), total, "duplicate sequence values allocated");
    values.sort_unstable();
    assert_eq!(values, (1..=total as i64).collect::<Vec<_>>());
}

// ============================================================================
// Uniqueness Under Contention
// ============================================================================

#[test]
fn test_concurrent_allocation_strict_mode() {
    let store = Arc::new(MemoryStore::with_mode(LockingMode::Strict));
    let values = allocate_concurrently(Arc::clone(&store));
    assert_dense_and_unique(values);
    assert_eq!(store.counter(&series()), Some((THREADS * PER_THREAD) as i64));
    assert_eq!(store.held_locks(), 0);
}

#[test]
fn test_concurrent_allocation_existing_rows_only() {
    // Counter starts absent: every thread may observe "absent" and race the insert.
    let store = Arc::new(MemoryStore::with_mode(LockingMode::ExistingRowsOnly));
    let values = allocate_concurrently(Arc::clone(&store));
    assert_dense_and_unique(values);
    assert_eq!(store.held_locks(), 0);
}

#[test]
fn test_duplicate_insert_race_recovers() {
    let store = Arc::new(MemoryStore::with_mode(LockingMode::ExistingRowsOnly));
    let alloc = SequenceAllocator::new();

    // Winner inserts the counter and keeps its transaction open.
    let mut winner = store.begin().unwrap();
    assert_eq!(alloc.next_value(winner.as_mut(), &series(), 1).unwrap(), 1);

    let loser_store = Arc::clone(&store);
    let loser_done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&loser_done);
    let loser = thread::spawn(move || {
        let mut txn = loser_store.begin().unwrap();
        let value = SequenceAllocator::new()
            .next_value(txn.as_mut(), &series(), 1)
            .unwrap();
        txn.commit().unwrap();
        flag.store(true, Ordering::SeqCst);
        value
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!loser_done.load(Ordering::SeqCst), "loser must wait for the winner");

    winner.commit().unwrap();
    assert_eq!(loser.join().unwrap(), 2);
    assert_eq!(store.counter(&series()), Some(2));
}

// ============================================================================
// Lock Scope
// ============================================================================

#[test]
fn test_lock_held_until_commit() {
    let store = Arc::new(MemoryStore::new());
    store.set_counter(&series(), 10);
    let alloc = SequenceAllocator::new();

    let mut holder = store.begin().unwrap();
    alloc.next_value(holder.as_mut(), &series(), 1).unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter_store = Arc::clone(&store);
    let waiter = thread::spawn(move || {
        let mut txn = waiter_store.begin().unwrap();
        let value = SequenceAllocator::new()
            .next_value(txn.as_mut(), &series(), 1)
            .unwrap();
        txn.commit().unwrap();
        tx.send(value).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    holder.rollback().unwrap();
    // The rolled-back increment is not observed.
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 11);
    waiter.join().unwrap();
}

#[test]
fn test_different_series_do_not_contend() {
    let store = Arc::new(MemoryStore::new());
    let alloc = SequenceAllocator::new();

    let mut holder = store.begin().unwrap();
    alloc.next_value(holder.as_mut(), &series(), 1).unwrap();

    let (tx, rx) = mpsc::channel();
    let other_store = Arc::clone(&store);
    let other = thread::spawn(move || {
        let mut txn = other_store.begin().unwrap();
        let value = SequenceAllocator::new()
            .next_value(txn.as_mut(), &SeriesKey::from_raw("SUPPSPAACM"), 1)
            .unwrap();
        txn.commit().unwrap();
        tx.send(value).unwrap();
    });

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    other.join().unwrap();
    holder.commit().unwrap();
}

// ============================================================================
// Concurrent Entity Creation
// ============================================================================

#[test]
fn test_concurrent_create_entity_yields_unique_identifiers() {
    for mode in [LockingMode::Strict, LockingMode::ExistingRowsOnly] {
        let store = Arc::new(MemoryStore::with_mode(mode));
        store.create_table("Customer", ["customer_name", "company"]);
        let deriver = Arc::new(KeyDeriver::new(Arc::new(
            StaticGroupDirectory::new()
                .with_group("Acme Inc", "ACM")
                .with_default("Acme Inc"),
        )));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                let deriver = Arc::clone(&deriver);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let naming = Naming::new(&deriver, EntityProfile::customer());
                    barrier.wait();
                    (0..5)
                        .map(|i| {
                            let ctx = NamingContext::new(format!("Spar {t}-{i}"));
                            naming
                                .create_entity(store.as_ref(), &ctx, BTreeMap::new())
                                .unwrap()
                                .into_string()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), THREADS * 5, "mode {mode:?}");
        assert_eq!(store.records("Customer").len(), THREADS * 5);
        assert_eq!(
            store.counter(&SeriesKey::from_raw("CUSTSPAACM")),
            Some((THREADS * 5) as i64)
        );
    }
}

#[test]
fn test_same_name_in_two_groups_is_created_once() {
    let deriver = Arc::new(KeyDeriver::new(Arc::new(
        StaticGroupDirectory::new()
            .with_group("Acme Inc", "ACM")
            .with_group("Beta", "BET")
            .with_default("Acme Inc"),
    )));

    for _ in 0..50 {
        let store = Arc::new(MemoryStore::new());
        store.create_table("Customer", ["customer_name", "company"]);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["Acme Inc", "Beta"]
            .into_iter()
            .map(|group| {
                let store = Arc::clone(&store);
                let deriver = Arc::clone(&deriver);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let naming = Naming::new(&deriver, EntityProfile::customer());
                    let ctx = NamingContext::new("Spar").with_group(group);
                    barrier.wait();
                    naming.create_entity(store.as_ref(), &ctx, BTreeMap::new())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(created, 1, "{results:?}");
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(nomen_core::Error::DuplicateName { .. }))));
        assert_eq!(store.records("Customer").len(), 1);
        assert_eq!(store.held_locks(), 0);
    }
}
