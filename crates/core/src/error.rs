//! Error types for Nomen
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Categories
//!
//! | Category | Variants | Handling |
//! |----------|----------|----------|
//! | Input | `MissingDisplayName`, `DuplicateName`, `UnknownEntityType`, `InvalidConfig` | Fatal to the single operation |
//! | Race | `DuplicateKey` | Recovered inside the allocator |
//! | Schema | `UnknownTable`, `UnknownField` | Caught per reference field |
//! | Record | `RecordNotFound` | Caught per migrated record |
//! | Allocation | `Allocation`, `CounterUnavailable`, `SequenceExhausted` | Surfaced to the caller |
//! | Fatal | `PageFetch` | Aborts a migration run |
//! | System | `Io`, `Serialization`, `Storage`, `TransactionClosed` | Propagated |

use std::io;
use thiserror::Error;

use crate::types::{EntityType, SeriesKey};

/// Result type alias for Nomen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Nomen
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (dataset and config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The display name needed to derive an identifier is missing or blank
    #[error("{entity_type} name is required to generate the ID")]
    MissingDisplayName {
        /// Entity type being named
        entity_type: EntityType,
    },

    /// Another entity of the type already carries the same normalized name
    #[error("A {entity_type} with the name '{name}' already exists: {existing}")]
    DuplicateName {
        /// Entity type being validated
        entity_type: EntityType,
        /// Display name of the existing entity
        name: String,
        /// Identifier of the existing entity
        existing: String,
    },

    /// No naming profile is registered for the entity type
    #[error("Unsupported entity type: {0}")]
    UnknownEntityType(String),

    /// Configuration could not be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A unique key already exists
    #[error("Duplicate key in {table}: {key}")]
    DuplicateKey {
        /// Table (or counter store) holding the key
        table: String,
        /// Conflicting key
        key: String,
    },

    /// The record to operate on does not exist
    #[error("{entity_type} {identifier} not found")]
    RecordNotFound {
        /// Entity type searched
        entity_type: EntityType,
        /// Missing identifier
        identifier: String,
    },

    /// A referenced table does not exist in the store
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A referenced column does not exist on its table
    #[error("Unknown field {table}.{field}")]
    UnknownField {
        /// Table searched
        table: String,
        /// Missing field
        field: String,
    },

    /// The counter row vanished after a duplicate-insert report
    #[error("Failed to initialize or retrieve series counter for '{0}' after concurrency issue")]
    CounterUnavailable(SeriesKey),

    /// The series has no value left after its current one
    #[error("Sequence '{0}' has reached its maximum value")]
    SequenceExhausted(String),

    /// Sequence allocation failed; no identifier may be assigned
    #[error("Failed to generate the next ID number for series '{series_key}': {source}")]
    Allocation {
        /// Series being allocated
        series_key: SeriesKey,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A migration page could not be fetched; the run cannot continue
    #[error("Could not fetch batch for {entity_type} after {after:?}: {source}")]
    PageFetch {
        /// Entity type being migrated
        entity_type: EntityType,
        /// Cursor of the failed page
        after: Option<String>,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The transaction was already committed or rolled back
    #[error("Transaction is no longer active")]
    TransactionClosed,

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Wrap an error as an allocation failure for `series_key`
    pub fn allocation(series_key: &SeriesKey, source: Error) -> Self {
        Error::Allocation {
            series_key: series_key.clone(),
            source: Box::new(source),
        }
    }

    /// True for the duplicate-insert race the allocator recovers from
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::DuplicateKey { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
