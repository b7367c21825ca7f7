//! Nomen - collision-free entity identifiers
//!
//! Nomen names business entities `{prefix}{group}{sequence}` (e.g.
//! `SPAACM001` for "Spar Group" owned by "Acme Inc") from atomically
//! incremented per-series counters, and migrates existing records onto that
//! scheme while rewriting every reference to them.
//!
//! # Quick Start
//!
//! ```ignore
//! use nomen::{EntityProfile, KeyDeriver, MemoryStore, Naming, NamingContext, StaticGroupDirectory};
//! use std::sync::Arc;
//!
//! let store = MemoryStore::new();
//! store.create_table("Customer", ["customer_name", "company"]);
//! let deriver = KeyDeriver::new(Arc::new(StaticGroupDirectory::new().with_group("Acme Inc", "ACM")));
//!
//! let naming = Naming::new(&deriver, EntityProfile::customer());
//! let id = naming.create_entity(&store, &NamingContext::new("Spar").with_group("Acme Inc"), Default::default())?;
//! assert_eq!(id, "SPAACM001");
//! ```
//!
//! # Architecture
//!
//! - `nomen-core`: domain types, errors, and the storage/lookup traits
//! - `nomen-storage`: in-memory store with row locks, static providers, datasets
//! - `nomen-engine`: derivation, allocation, propagation, migration, naming

pub use nomen_core::*;
pub use nomen_engine::*;
pub use nomen_storage::{
    ChildLink, Dataset, LoadedDataset, LockingMode, MemoryStore, StaticCatalog,
    StaticGroupDirectory,
};
