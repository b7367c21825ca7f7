//! Atomic per-series sequence allocation
//!
//! Each series key owns one counter row. Allocation locks that row for the
//! rest of the caller's transaction, reads it, and writes `value + 1`, so two
//! callers on the same series are serialized and never observe the same
//! value. Different series keys never contend.
//!
//! Storage engines that do not lock absent rows let two callers both see
//! "no counter yet". Both then try to insert it; the loser gets
//! `DuplicateKey`, re-locks the now existing row, and increments it.

use tracing::{debug, info, warn};

use nomen_core::{CounterKey, Error, Result, SeriesKey, Transaction};

use crate::derive::format_sequence;

/// Hands out sequence numbers from persisted counters
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceAllocator;

impl SequenceAllocator {
    /// Create an allocator
    pub fn new() -> Self {
        Self
    }

    /// Allocate the next number of `series_key`, formatted to `padding` digits
    ///
    /// The counter lock is held until `txn` commits or rolls back. A rollback
    /// discards the increment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Allocation` wrapping the storage failure, or wrapping
    /// `CounterUnavailable` when the counter vanished after a duplicate-insert
    /// report. No identifier may be assigned in that case.
    pub fn allocate_next(
        &self,
        txn: &mut dyn Transaction,
        series_key: &SeriesKey,
        padding: usize,
        initial_value: i64,
    ) -> Result<String> {
        let value = self
            .next_value(txn, series_key, initial_value)
            .map_err(|e| Error::allocation(series_key, e))?;
        Ok(format_sequence(value, padding))
    }

    /// Allocate the next raw value of `series_key`
    ///
    /// # Errors
    ///
    /// Returns the unwrapped storage error.
    pub fn next_value(
        &self,
        txn: &mut dyn Transaction,
        series_key: &SeriesKey,
        initial_value: i64,
    ) -> Result<i64> {
        let key = series_key.counter_key();
        match txn.lock_counter(&key)? {
            Some(current) => increment(txn, &key, current),
            None => match txn.insert_counter(&key, initial_value) {
                Ok(()) => {
                    info!(target: "nomen::alloc", series = %series_key, value = initial_value, "Initialized series counter");
                    Ok(initial_value)
                }
                Err(e) if e.is_duplicate_key() => {
                    warn!(
                        target: "nomen::alloc",
                        series = %series_key,
                        "Duplicate counter insert for series, likely a concurrent request; retrying"
                    );
                    match txn.lock_counter(&key)? {
                        Some(current) => increment(txn, &key, current),
                        None => Err(Error::CounterUnavailable(series_key.clone())),
                    }
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Raise the counter of `series_key` to at least `floor`
    ///
    /// Creates the counter at `floor` when absent. Returns the resulting
    /// value. Used after migration so fresh allocations skip numbers the
    /// migration consumed.
    ///
    /// # Errors
    ///
    /// Returns the storage error, or `CounterUnavailable` as for allocation.
    pub fn advance_to(
        &self,
        txn: &mut dyn Transaction,
        series_key: &SeriesKey,
        floor: i64,
    ) -> Result<i64> {
        let key = series_key.counter_key();
        let current = match txn.lock_counter(&key)? {
            Some(current) => current,
            None => match txn.insert_counter(&key, floor) {
                Ok(()) => {
                    debug!(target: "nomen::alloc", series = %series_key, floor, "Created counter at floor");
                    return Ok(floor);
                }
                Err(e) if e.is_duplicate_key() => txn
                    .lock_counter(&key)?
                    .ok_or_else(|| Error::CounterUnavailable(series_key.clone()))?,
                Err(e) => return Err(e),
            },
        };
        if current >= floor {
            return Ok(current);
        }
        txn.write_counter(&key, floor)?;
        debug!(target: "nomen::alloc", series = %series_key, from = current, to = floor, "Advanced counter");
        Ok(floor)
    }
}

fn increment(txn: &mut dyn Transaction, key: &CounterKey, current: i64) -> Result<i64> {
    let next = current
        .checked_add(1)
        .ok_or_else(|| Error::SequenceExhausted(key.to_string()))?;
    txn.write_counter(key, next)?;
    debug!(target: "nomen::alloc", counter = %key, value = next, "Allocated");
    Ok(next)
}
