//! Naming engine for Nomen
//!
//! This crate builds identifiers and migrates existing ones:
//! - KeyDeriver: name prefix, group abbreviation, series key, identifier
//! - SequenceAllocator: atomic per-series counters with race recovery
//! - ReferencePropagator: retargets direct and polymorphic references
//! - RenameEngine: batched, checkpointed migration with dry-run support
//! - Naming: uniqueness check and identifier assignment for new entities
//! - NomenConfig: `nomen.toml` settings and entity profiles
//!
//! The engine only talks to storage through the `nomen_core` traits, so any
//! `RecordStore` with row-level counter locks can host it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod config;
pub mod derive;
pub mod naming;
pub mod propagate;
pub mod rename;

pub use allocator::SequenceAllocator;
pub use config::{EntityProfile, NomenConfig, CONFIG_FILE_NAME};
pub use derive::{
    build_identifier, derive_prefix, format_sequence, matches_scheme, parse_sequence, series_key,
    KeyDeriver, NameParts,
};
pub use naming::{Naming, NamingContext};
pub use propagate::{FieldOutcome, FieldReport, PropagationReport, ReferencePropagator};
pub use rename::{
    MigrationOptions, MigrationOutcome, MigrationSummary, OutcomeKind, RenameEngine, StopSignal,
};
