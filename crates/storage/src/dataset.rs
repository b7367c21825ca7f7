//! JSON dataset snapshots
//!
//! A dataset file holds everything a [`MemoryStore`] needs plus the two
//! lookup providers, so the CLI can load, migrate, and write back a complete
//! system state.
//!
//! # Example
//!
//! ```json
//! {
//!   "default_group": "Acme Inc",
//!   "groups": [{ "id": "Acme Inc", "abbr": "ACM" }],
//!   "tables": {
//!     "Customer": {
//!       "fields": ["customer_name", "company"],
//!       "rows": [{ "identifier": "CUST-0001", "customer_name": "Spar", "company": "Acme Inc" }]
//!     }
//!   },
//!   "children": [],
//!   "references": {
//!     "direct": [{ "target": "Customer", "owner_type": "Sales Invoice", "field": "customer" }],
//!     "polymorphic": [{ "owner_type": "Address", "value_field": "link_name", "type_field": "link_doctype" }]
//!   },
//!   "counters": [{ "series_key": "CUSTSPAACM", "value": 3 }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use nomen_core::limits::{COUNTER_FIELD, IDENTIFIER_FIELD};
use nomen_core::{
    CounterKey, DirectReference, EntityType, Error, PolymorphicReference, Record, Result,
    SeriesKey,
};

use crate::directory::{StaticCatalog, StaticGroupDirectory};
use crate::memory::{LockingMode, MemoryStore};
use crate::table::ChildLink;

/// A group and its abbreviation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Group identifier
    pub id: String,
    /// Abbreviation; empty or missing degrades to the sentinel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abbr: Option<String>,
}

/// Declared fields and rows of one table
///
/// Each row is a flat map that must contain an `identifier` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    /// Declared fields (excluding the identifier)
    #[serde(default)]
    pub fields: Vec<String>,
    /// Rows as flat field maps
    #[serde(default)]
    pub rows: Vec<BTreeMap<String, String>>,
}

/// A direct reference together with its target type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectEntry {
    /// Type the field points at
    pub target: EntityType,
    /// Owning type
    pub owner_type: EntityType,
    /// Field name
    pub field: String,
}

/// Reference catalog contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Direct references
    #[serde(default)]
    pub direct: Vec<DirectEntry>,
    /// Polymorphic references
    #[serde(default)]
    pub polymorphic: Vec<PolymorphicReference>,
}

/// One persisted counter row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntry {
    /// Series key
    pub series_key: SeriesKey,
    /// Counter name within the series
    #[serde(default = "default_counter_name")]
    pub counter: String,
    /// Last value handed out
    pub value: i64,
}

fn default_counter_name() -> String {
    COUNTER_FIELD.to_string()
}

/// Serialized system state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Group used when a record names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_group: Option<String>,
    /// Known groups
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    /// Tables by entity type name
    #[serde(default)]
    pub tables: BTreeMap<String, TableData>,
    /// Child-table linkage
    #[serde(default)]
    pub children: Vec<ChildLink>,
    /// Reference catalog
    #[serde(default)]
    pub references: ReferenceData,
    /// Series counters
    #[serde(default)]
    pub counters: Vec<CounterEntry>,
}

/// A dataset materialized into live providers
#[derive(Debug)]
pub struct LoadedDataset {
    /// Record store holding tables and counters
    pub store: MemoryStore,
    /// Reference catalog
    pub catalog: StaticCatalog,
    /// Group directory
    pub directory: StaticGroupDirectory,
}

impl Dataset {
    /// Read and parse a dataset file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let dataset: Dataset = serde_json::from_str(&content)?;
        info!(
            target: "nomen::storage",
            path = %path.display(),
            tables = dataset.tables.len(),
            counters = dataset.counters.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Write the dataset as pretty JSON, replacing the file atomically
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        info!(target: "nomen::storage", path = %path.display(), "Dataset saved");
        Ok(())
    }

    /// Build the store, catalog, and directory described by this dataset
    ///
    /// # Errors
    ///
    /// Returns an error if a row lacks an identifier, uses an undeclared
    /// field, or repeats an identifier, or if a child link names an unknown
    /// table or field.
    pub fn materialize(&self, mode: LockingMode) -> Result<LoadedDataset> {
        let store = MemoryStore::with_mode(mode);
        for (name, table) in &self.tables {
            store.create_table(name.as_str(), table.fields.iter().cloned());
            for row in &table.rows {
                store.insert(name.as_str(), row_to_record(name, row)?)?;
            }
        }
        for link in &self.children {
            store.with_tables(|tables| {
                tables.table(&link.parent_type)?;
                tables.check_link(link)
            })?;
            store.link_children(link.clone());
        }
        for entry in &self.counters {
            store.set_counter(&entry.series_key, entry.value);
        }

        let mut catalog = StaticCatalog::new();
        for entry in &self.references.direct {
            catalog = catalog.with_direct(
                entry.target.clone(),
                DirectReference::new(entry.owner_type.clone(), entry.field.clone()),
            );
        }
        for reference in &self.references.polymorphic {
            catalog = catalog.with_polymorphic(reference.clone());
        }

        let mut directory = StaticGroupDirectory::new();
        for group in &self.groups {
            if let Some(abbr) = &group.abbr {
                directory = directory.with_group(group.id.clone(), abbr.clone());
            }
        }
        if let Some(default) = &self.default_group {
            directory = directory.with_default(default.clone());
        }

        Ok(LoadedDataset {
            store,
            catalog,
            directory,
        })
    }

    /// Replace tables and counters with the committed state of `store`
    pub fn refresh_from(&mut self, store: &MemoryStore) {
        let tables = store.with_tables(|tables| {
            tables
                .iter()
                .map(|(name, table)| {
                    let data = TableData {
                        fields: table.fields().map(str::to_string).collect(),
                        rows: table.rows().map(record_to_row).collect(),
                    };
                    (name.to_string(), data)
                })
                .collect()
        });
        self.tables = tables;
        self.counters = store
            .counters()
            .into_iter()
            .map(|(key, value)| counter_entry(key, value))
            .collect();
    }
}

fn row_to_record(table: &str, row: &BTreeMap<String, String>) -> Result<Record> {
    let identifier = row.get(IDENTIFIER_FIELD).ok_or_else(|| {
        Error::Serialization(format!("row in table '{table}' has no '{IDENTIFIER_FIELD}'"))
    })?;
    let mut record = Record::new(identifier.clone());
    for (field, value) in row.iter().filter(|(f, _)| f.as_str() != IDENTIFIER_FIELD) {
        record.fields.insert(field.clone(), value.clone());
    }
    Ok(record)
}

fn record_to_row(record: &Record) -> BTreeMap<String, String> {
    let mut row = record.fields.clone();
    row.insert(IDENTIFIER_FIELD.to_string(), record.identifier.clone());
    row
}

fn counter_entry(key: CounterKey, value: i64) -> CounterEntry {
    CounterEntry {
        series_key: key.series_key,
        counter: key.counter,
        value,
    }
}
