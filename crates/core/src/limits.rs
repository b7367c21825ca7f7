//! Naming constants and sentinels
//!
//! These values define the identifier format. Changing any of them changes
//! which existing identifiers classify as correctly formatted, so they are
//! treated as frozen.

/// Abbreviation used when the owning group cannot be resolved
pub const DEFAULT_GROUP_ABBR: &str = "CO";

/// Name prefix used when a display name has no alphanumeric characters
pub const DEFAULT_NAME_PREFIX: &str = "UNK";

/// Minimum number of digits in a formatted sequence
pub const DEFAULT_PADDING: usize = 3;

/// Number of leading alphanumeric characters taken from a display name
pub const MAX_PREFIX_LENGTH: usize = 3;

/// Records per page (and per checkpoint) during migration
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Renamed records listed individually in a migration summary
pub const MAX_LISTED_RENAMES: usize = 1000;

/// First value handed out by a fresh series
pub const DEFAULT_INITIAL_VALUE: i64 = 1;

/// Counter name stored alongside each series key
pub const COUNTER_FIELD: &str = "current_value";

/// Pseudo-field naming a record's primary key in filters and references
pub const IDENTIFIER_FIELD: &str = "identifier";
