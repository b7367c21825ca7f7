//! Core types for Nomen
//!
//! This module defines the foundational types:
//! - EntityType: Name of a stored entity type (e.g. "Customer")
//! - SeriesKey: Key of one independent sequence counter
//! - EntityIdentifier: Human-readable primary key of an entity
//! - CounterKey: Address of a persisted counter row
//! - Record: A stored row with its identifier and field values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::limits::{COUNTER_FIELD, IDENTIFIER_FIELD};

/// Name of an entity type, such as `Customer` or `Sales Invoice`
///
/// Entity types name tables in the record store and appear as the
/// discriminator value in polymorphic references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Create an entity type from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the type name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Key of one independent sequence counter
///
/// Format: `{type_tag}{name_prefix}{group_abbr}`, e.g. `CUSTSPAABC`.
/// Identical inputs always produce the identical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Compose a series key from its parts
    pub fn compose(type_tag: &str, name_prefix: &str, group_abbr: &str) -> Self {
        Self(format!("{type_tag}{name_prefix}{group_abbr}"))
    }

    /// Wrap an already-composed key (e.g. one read back from storage)
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address of the counter row backing this series
    pub fn counter_key(&self) -> CounterKey {
        CounterKey::new(self.clone())
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable primary key of an entity
///
/// Format: `{name_prefix}{group_abbr}{sequence}` where the sequence is
/// zero-padded to at least the configured width, e.g. `SPAABC001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityIdentifier(String);

impl EntityIdentifier {
    /// Compose an identifier from a combined prefix and a formatted sequence
    pub fn compose(name_prefix: &str, group_abbr: &str, sequence: &str) -> Self {
        Self(format!("{name_prefix}{group_abbr}{sequence}"))
    }

    /// Wrap an existing identifier
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for EntityIdentifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EntityIdentifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Address of a persisted counter row: `(series_key, counter_name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CounterKey {
    /// Series the counter belongs to
    pub series_key: SeriesKey,
    /// Counter name within the series (always [`COUNTER_FIELD`] today)
    pub counter: String,
}

impl CounterKey {
    /// Counter row for a series using the standard counter name
    pub fn new(series_key: SeriesKey) -> Self {
        Self {
            series_key,
            counter: COUNTER_FIELD.to_string(),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.series_key, self.counter)
    }
}

/// A stored row
///
/// Field values are plain strings; a field absent from `fields` is null.
/// The identifier is addressable in filters as the pseudo-field
/// [`IDENTIFIER_FIELD`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Primary key
    pub identifier: String,
    /// Field values by field name
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Record {
    /// Create a record with no fields
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Read a field, resolving the identifier pseudo-field
    pub fn get(&self, field: &str) -> Option<&str> {
        if field == IDENTIFIER_FIELD {
            return Some(&self.identifier);
        }
        self.fields.get(field).map(String::as_str)
    }
}
