//! Core types and traits for Nomen
//!
//! This crate defines the foundational types used throughout the system:
//! - EntityType, SeriesKey, EntityIdentifier, CounterKey, Record
//! - Reference descriptors: DirectReference, PolymorphicReference, ReferenceField
//! - RowFilter: typed predicates executed by stores
//! - Error: Error type hierarchy
//! - Traits: RecordStore, Transaction, GroupDirectory, ReferenceCatalog
//! - Limits: identifier format constants and sentinels

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod reference;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use reference::{
    normalize_name, Condition, DirectReference, PolymorphicReference, ReferenceField, RowFilter,
};
pub use traits::{GroupDirectory, RecordStore, ReferenceCatalog, Transaction};
pub use types::{CounterKey, EntityIdentifier, EntityType, Record, SeriesKey};
