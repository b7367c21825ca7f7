//! Storage layer for Nomen
//!
//! This crate implements the in-memory reference backend with:
//! - MemoryStore: BTreeMap-based record tables and counter rows behind `RwLock`
//! - LockManager: blocking, re-entrant, transaction-scoped row locks
//! - StaticCatalog / StaticGroupDirectory: read-only lookup providers
//! - Dataset: JSON snapshot format for a complete system state
//!
//! # Locking
//!
//! Counter rows lock individually, so allocations on different series keys
//! never contend. Record writes serialize on one store-wide writer lock held
//! until the writing transaction ends.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dataset;
pub mod directory;
pub mod lock;
pub mod memory;
pub mod table;

pub use dataset::{Dataset, LoadedDataset};
pub use directory::{StaticCatalog, StaticGroupDirectory};
pub use lock::{LockManager, LockResource, TxnId};
pub use memory::{LockingMode, MemoryStore, MemoryTransaction};
pub use table::{ChildLink, Table, Tables};
