//! Ordered record tables
//!
//! `Tables` is the plain data behind [`MemoryStore`](crate::MemoryStore):
//! one `BTreeMap` per entity type keyed by identifier, so paging in
//! identifier order is a range scan. Every table declares its fields; filters
//! and updates naming an undeclared field fail with `UnknownField`, which is
//! how a stale reference descriptor shows up.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use nomen_core::limits::IDENTIFIER_FIELD;
use nomen_core::{EntityType, Error, Record, Result, RowFilter};

/// Child-table linkage maintained by `rename`
///
/// Rows of `child_type` whose `parent_field` equals a renamed `parent_type`
/// identifier are re-pointed at the new identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLink {
    /// Table whose identifiers are renamed
    pub parent_type: EntityType,
    /// Table holding child rows
    pub child_type: EntityType,
    /// Field on the child row holding the parent identifier
    pub parent_field: String,
}

/// One table: declared fields plus rows by identifier
#[derive(Debug, Clone, Default)]
pub struct Table {
    fields: BTreeSet<String>,
    rows: BTreeMap<String, Record>,
}

impl Table {
    /// Create an empty table with the given declared fields
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            rows: BTreeMap::new(),
        }
    }

    /// Declared fields
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Rows in identifier order
    pub fn rows(&self) -> impl Iterator<Item = &Record> {
        self.rows.values()
    }

    fn has_field(&self, field: &str) -> bool {
        field == IDENTIFIER_FIELD || self.fields.contains(field)
    }
}

/// All tables of a store plus child linkage
#[derive(Debug, Clone, Default)]
pub struct Tables {
    tables: BTreeMap<EntityType, Table>,
    children: Vec<ChildLink>,
}

impl Tables {
    /// Create an empty table set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table
    pub fn create_table(&mut self, name: EntityType, table: Table) {
        self.tables.insert(name, table);
    }

    /// Register child linkage
    pub fn link_children(&mut self, link: ChildLink) {
        self.children.push(link);
    }

    /// Registered child linkage
    pub fn children(&self) -> &[ChildLink] {
        &self.children
    }

    /// Iterate tables by name
    pub fn iter(&self) -> impl Iterator<Item = (&EntityType, &Table)> {
        self.tables.iter()
    }

    /// Look up one table
    pub fn table(&self, name: &EntityType) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &EntityType) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Look up one record
    pub fn get(&self, table: &EntityType, identifier: &str) -> Result<Option<&Record>> {
        Ok(self.table(table)?.rows.get(identifier))
    }

    /// Up to `limit` records after `after`, in identifier order
    pub fn list_page(
        &self,
        table: &EntityType,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let rows = &self.table(table)?.rows;
        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor.to_string()),
            None => Bound::Unbounded,
        };
        Ok(rows
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    /// Identifiers starting with `prefix`, in identifier order
    pub fn identifiers_with_prefix(&self, table: &EntityType, prefix: &str) -> Result<Vec<String>> {
        let rows = &self.table(table)?.rows;
        Ok(rows
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn check_filter(&self, filter: &RowFilter) -> Result<&Table> {
        let table = self.table(&filter.table)?;
        for field in filter.fields() {
            if !table.has_field(field) {
                return Err(Error::UnknownField {
                    table: filter.table.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(table)
    }

    /// First matching record in identifier order
    pub fn find_first(&self, filter: &RowFilter) -> Result<Option<Record>> {
        let table = self.check_filter(filter)?;
        Ok(table.rows.values().find(|r| filter.matches(r)).cloned())
    }

    /// Number of matching records
    pub fn count_matching(&self, filter: &RowFilter) -> Result<usize> {
        let table = self.check_filter(filter)?;
        Ok(table.rows.values().filter(|r| filter.matches(r)).count())
    }

    /// Set `field = value` on every matching record
    ///
    /// The identifier pseudo-field cannot be updated this way; use `rename`.
    pub fn update_matching(&mut self, filter: &RowFilter, field: &str, value: &str) -> Result<usize> {
        let table = self.check_filter(filter)?;
        if field == IDENTIFIER_FIELD || !table.has_field(field) {
            return Err(Error::UnknownField {
                table: filter.table.to_string(),
                field: field.to_string(),
            });
        }
        let table = self.table_mut(&filter.table)?;
        let mut updated = 0;
        for record in table.rows.values_mut().filter(|r| filter.matches(r)) {
            record.fields.insert(field.to_string(), value.to_string());
            updated += 1;
        }
        Ok(updated)
    }

    /// Insert a record, rejecting undeclared fields and duplicate identifiers
    pub fn insert(&mut self, table_name: &EntityType, record: Record) -> Result<()> {
        let table = self.table_mut(table_name)?;
        if let Some(field) = record.fields.keys().find(|f| !table.fields.contains(*f)) {
            return Err(Error::UnknownField {
                table: table_name.to_string(),
                field: field.clone(),
            });
        }
        if table.rows.contains_key(&record.identifier) {
            return Err(Error::DuplicateKey {
                table: table_name.to_string(),
                key: record.identifier,
            });
        }
        table.rows.insert(record.identifier.clone(), record);
        Ok(())
    }

    /// Move a record to a new identifier and re-point its child rows
    ///
    /// Every child link is checked before anything moves, so an error leaves
    /// the tables untouched.
    pub fn rename(&mut self, table_name: &EntityType, old_id: &str, new_id: &str) -> Result<()> {
        let table = self.table(table_name)?;
        if table.rows.contains_key(new_id) {
            return Err(Error::DuplicateKey {
                table: table_name.to_string(),
                key: new_id.to_string(),
            });
        }
        if !table.rows.contains_key(old_id) {
            return Err(Error::RecordNotFound {
                entity_type: table_name.clone(),
                identifier: old_id.to_string(),
            });
        }

        let links: Vec<ChildLink> = self
            .children
            .iter()
            .filter(|link| &link.parent_type == table_name)
            .cloned()
            .collect();
        for link in &links {
            self.check_link(link)?;
        }

        let table = self.table_mut(table_name)?;
        if let Some(mut record) = table.rows.remove(old_id) {
            record.identifier = new_id.to_string();
            table.rows.insert(new_id.to_string(), record);
        }
        for link in links {
            let filter = RowFilter::new(link.child_type.clone()).eq(&link.parent_field, old_id);
            self.update_matching(&filter, &link.parent_field, new_id)?;
        }
        Ok(())
    }

    /// Check that a link's child table exists and declares its parent field
    pub fn check_link(&self, link: &ChildLink) -> Result<()> {
        let child = self.table(&link.child_type)?;
        if link.parent_field == IDENTIFIER_FIELD || !child.fields.contains(&link.parent_field) {
            return Err(Error::UnknownField {
                table: link.child_type.to_string(),
                field: link.parent_field.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> Tables {
        let mut tables = Tables::new();
        tables.create_table("Customer".into(), Table::new(["customer_name", "company"]));
        tables.create_table("Customer Note".into(), Table::new(["parent", "note"]));
        tables.link_children(ChildLink {
            parent_type: "Customer".into(),
            child_type: "Customer Note".into(),
            parent_field: "parent".to_string(),
        });
        for id in ["B-2", "A-1", "C-3"] {
            tables
                .insert(&"Customer".into(), Record::new(id).with_field("customer_name", id))
                .unwrap();
        }
        tables
    }

    #[test]
    fn test_list_page_is_ordered_and_keyset() {
        let tables = customers();
        let first = tables.list_page(&"Customer".into(), None, 2).unwrap();
        let ids: Vec<_> = first.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, ["A-1", "B-2"]);

        let rest = tables.list_page(&"Customer".into(), Some("B-2"), 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].identifier, "C-3");
    }

    #[test]
    fn test_identifiers_with_prefix() {
        let mut tables = customers();
        tables
            .insert(&"Customer".into(), Record::new("SPAABC002"))
            .unwrap();
        tables
            .insert(&"Customer".into(), Record::new("SPAABC010"))
            .unwrap();
        let ids = tables
            .identifiers_with_prefix(&"Customer".into(), "SPAABC")
            .unwrap();
        assert_eq!(ids, ["SPAABC002", "SPAABC010"]);
    }

    #[test]
    fn test_unknown_field_in_filter() {
        let tables = customers();
        let filter = RowFilter::new("Customer".into()).eq("missing", "x");
        assert!(matches!(
            tables.count_matching(&filter),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn test_unknown_table() {
        let tables = customers();
        let filter = RowFilter::new("Lead".into());
        assert!(matches!(
            tables.count_matching(&filter),
            Err(Error::UnknownTable(_))
        ));
    }

    #[test]
    fn test_rename_moves_record_and_children() {
        let mut tables = customers();
        tables
            .insert(
                &"Customer Note".into(),
                Record::new("N-1").with_field("parent", "A-1"),
            )
            .unwrap();

        tables.rename(&"Customer".into(), "A-1", "SPAABC001").unwrap();

        assert!(tables.get(&"Customer".into(), "A-1").unwrap().is_none());
        let moved = tables.get(&"Customer".into(), "SPAABC001").unwrap().unwrap();
        assert_eq!(moved.identifier, "SPAABC001");
        let note = tables.get(&"Customer Note".into(), "N-1").unwrap().unwrap();
        assert_eq!(note.get("parent"), Some("SPAABC001"));
    }

    #[test]
    fn test_rename_rejects_existing_target() {
        let mut tables = customers();
        let err = tables.rename(&"Customer".into(), "A-1", "B-2").unwrap_err();
        assert!(err.is_duplicate_key());
        assert!(tables.get(&"Customer".into(), "A-1").unwrap().is_some());
    }

    #[test]
    fn test_rename_with_broken_child_link_changes_nothing() {
        let mut tables = customers();
        tables.link_children(ChildLink {
            parent_type: "Customer".into(),
            child_type: "Dropped Child".into(),
            parent_field: "parent".to_string(),
        });

        let err = tables.rename(&"Customer".into(), "A-1", "SPAABC001").unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));
        assert!(tables.get(&"Customer".into(), "A-1").unwrap().is_some());
        assert!(tables.get(&"Customer".into(), "SPAABC001").unwrap().is_none());
    }

    #[test]
    fn test_update_rejects_identifier_field() {
        let mut tables = customers();
        let filter = RowFilter::new("Customer".into());
        assert!(tables
            .update_matching(&filter, IDENTIFIER_FIELD, "X")
            .is_err());
    }
}
