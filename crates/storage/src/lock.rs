//! Row-level lock manager
//!
//! Provides `SELECT ... FOR UPDATE` semantics for the in-memory store:
//! - One owner per resource; the owner may re-acquire freely (re-entrant)
//! - A colliding caller blocks until the owner releases, it never fails fast
//! - Callers on different resources never wait on each other
//! - Locks are released all at once when the owning transaction ends
//!
//! # Design
//!
//! A single `parking_lot::Mutex` guards the owner table and a `Condvar` wakes
//! waiters on release. The mutex is held only for the table lookup, never
//! across a wait, so unrelated resources only share a short critical section.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

use nomen_core::CounterKey;

/// Identifier of a transaction within one store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Something a transaction can lock
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockResource {
    /// A single series counter row
    Counter(CounterKey),
    /// The right to write records (store-wide)
    RecordWriter,
}

impl fmt::Display for LockResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockResource::Counter(key) => write!(f, "counter:{key}"),
            LockResource::RecordWriter => f.write_str("records"),
        }
    }
}

/// Owner table plus wakeup signal
#[derive(Debug, Default)]
pub struct LockManager {
    owners: Mutex<HashMap<LockResource, TxnId>>,
    released: Condvar,
}

impl LockManager {
    /// Create an empty lock manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `txn` owns `resource`
    ///
    /// Returns `true` if the lock was newly acquired, `false` if `txn`
    /// already held it.
    pub fn acquire(&self, resource: &LockResource, txn: TxnId) -> bool {
        let mut owners = self.owners.lock();
        loop {
            match owners.get(resource) {
                None => {
                    owners.insert(resource.clone(), txn);
                    trace!(target: "nomen::storage", %txn, %resource, "Lock acquired");
                    return true;
                }
                Some(owner) if *owner == txn => return false,
                Some(owner) => {
                    trace!(target: "nomen::storage", %txn, %resource, holder = %owner, "Waiting for lock");
                    self.released.wait(&mut owners);
                }
            }
        }
    }

    /// Current owner of `resource`, if any
    pub fn owner(&self, resource: &LockResource) -> Option<TxnId> {
        self.owners.lock().get(resource).copied()
    }

    /// True if `txn` currently owns `resource`
    pub fn is_held_by(&self, resource: &LockResource, txn: TxnId) -> bool {
        self.owner(resource) == Some(txn)
    }

    /// Release every resource in `resources` owned by `txn` and wake waiters
    pub fn release_all(&self, txn: TxnId, resources: &[LockResource]) {
        if resources.is_empty() {
            return;
        }
        let mut owners = self.owners.lock();
        for resource in resources {
            if owners.get(resource) == Some(&txn) {
                owners.remove(resource);
            }
        }
        drop(owners);
        self.released.notify_all();
    }

    /// Number of resources currently locked
    pub fn held_count(&self) -> usize {
        self.owners.lock().len()
    }
}
