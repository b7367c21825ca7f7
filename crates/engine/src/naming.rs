//! Identifier assignment for new entities
//!
//! Two explicit steps replace save hooks: [`Naming::check_uniqueness`] runs
//! first and rejects duplicate display names, then
//! [`Naming::generate_identifier`] allocates from the series counter. Running
//! them in that order means a rejected name never consumes a number.

use std::collections::BTreeMap;
use tracing::{error, info, warn};

use nomen_core::limits::{DEFAULT_INITIAL_VALUE, DEFAULT_PADDING, IDENTIFIER_FIELD};
use nomen_core::{EntityIdentifier, Error, Record, RecordStore, Result, RowFilter, Transaction};

use crate::allocator::SequenceAllocator;
use crate::config::EntityProfile;
use crate::derive::KeyDeriver;

/// The entity being named
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingContext {
    /// Display name, e.g. `Spar Group (Pty) Ltd`
    pub display_name: Option<String>,
    /// Owning group; `None` uses the default group
    pub group: Option<String>,
    /// Identifier of the record itself when updating an existing one
    pub current: Option<String>,
}

impl NamingContext {
    /// Context for a new entity with a display name
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..Self::default()
        }
    }

    /// Set the owning group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Exclude the record's own identifier from the uniqueness check
    pub fn with_current(mut self, identifier: impl Into<String>) -> Self {
        self.current = Some(identifier.into());
        self
    }

    fn name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// Names new entities of one profile
pub struct Naming<'a> {
    deriver: &'a KeyDeriver,
    profile: EntityProfile,
    allocator: SequenceAllocator,
    padding: usize,
    initial_value: i64,
}

impl<'a> Naming<'a> {
    /// Create a naming service with default padding and initial value
    pub fn new(deriver: &'a KeyDeriver, profile: EntityProfile) -> Self {
        Self {
            deriver,
            profile,
            allocator: SequenceAllocator::new(),
            padding: DEFAULT_PADDING,
            initial_value: DEFAULT_INITIAL_VALUE,
        }
    }

    /// Set the minimum sequence width
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Set the first value of fresh series
    pub fn with_initial_value(mut self, initial_value: i64) -> Self {
        self.initial_value = initial_value;
        self
    }

    /// Profile being named
    pub fn profile(&self) -> &EntityProfile {
        &self.profile
    }

    fn require_name<'c>(&self, ctx: &'c NamingContext) -> Result<&'c str> {
        ctx.name().ok_or_else(|| Error::MissingDisplayName {
            entity_type: self.profile.entity_type.clone(),
        })
    }

    /// Reject a display name another entity of the type already uses
    ///
    /// Names compare after trimming and lowercasing. The entity's table is
    /// locked first, so two transactions checking the same name run one
    /// after the other and the second sees the first's insert.
    ///
    /// # Errors
    ///
    /// `MissingDisplayName` for a blank name, `DuplicateName` naming the
    /// existing record, or the store error from the lookup.
    pub fn check_uniqueness(&self, txn: &mut dyn Transaction, ctx: &NamingContext) -> Result<()> {
        let name = self.require_name(ctx)?;
        txn.lock_table(&self.profile.entity_type)?;
        let mut filter = RowFilter::new(self.profile.entity_type.clone())
            .eq_normalized(&self.profile.name_field, name);
        if let Some(current) = &ctx.current {
            filter = filter.not_eq(IDENTIFIER_FIELD, current);
        }

        if let Some(existing) = txn.find_first(&filter)? {
            let existing_name = existing
                .get(&self.profile.name_field)
                .unwrap_or(name)
                .to_string();
            warn!(
                target: "nomen::naming",
                entity_type = %self.profile.entity_type,
                name,
                existing = %existing.identifier,
                "Duplicate display name rejected"
            );
            return Err(Error::DuplicateName {
                entity_type: self.profile.entity_type.clone(),
                name: existing_name,
                existing: existing.identifier,
            });
        }
        Ok(())
    }

    /// Allocate the next identifier for the entity
    ///
    /// # Errors
    ///
    /// `MissingDisplayName` for a blank name, or `Allocation` when the
    /// counter could not be advanced.
    pub fn generate_identifier(
        &self,
        txn: &mut dyn Transaction,
        ctx: &NamingContext,
    ) -> Result<EntityIdentifier> {
        let name = self.require_name(ctx)?;
        let parts = self.deriver.name_parts(name, ctx.group.as_deref());
        let series_key = parts.series_key(&self.profile.type_tag);

        let sequence = self
            .allocator
            .allocate_next(txn, &series_key, self.padding, self.initial_value)
            .map_err(|e| {
                error!(target: "nomen::naming", series = %series_key, error = %e, "Failed to generate identifier");
                e
            })?;

        let identifier = EntityIdentifier::compose(&parts.prefix, &parts.abbr, &sequence);
        info!(
            target: "nomen::naming",
            entity_type = %self.profile.entity_type,
            name,
            identifier = %identifier,
            "Generated identifier"
        );
        Ok(identifier)
    }

    /// Uniqueness check followed by generation
    ///
    /// # Errors
    ///
    /// Any error from either step.
    pub fn assign_identifier(
        &self,
        txn: &mut dyn Transaction,
        ctx: &NamingContext,
    ) -> Result<EntityIdentifier> {
        self.check_uniqueness(txn, ctx)?;
        self.generate_identifier(txn, ctx)
    }

    /// Create an entity in its own transaction
    ///
    /// Inserts the display name, the group (when given), and `fields`. On any
    /// error the transaction rolls back, the allocation included.
    ///
    /// # Errors
    ///
    /// Naming errors, or the store error from insert or commit.
    pub fn create_entity(
        &self,
        store: &dyn RecordStore,
        ctx: &NamingContext,
        fields: BTreeMap<String, String>,
    ) -> Result<EntityIdentifier> {
        let mut txn = store.begin()?;
        let identifier = self.assign_identifier(txn.as_mut(), ctx)?;

        let mut record = Record::new(identifier.as_str());
        record.fields = fields;
        if let Some(name) = ctx.name() {
            record
                .fields
                .insert(self.profile.name_field.clone(), name.to_string());
        }
        if let Some(group) = &ctx.group {
            record
                .fields
                .insert(self.profile.group_field.clone(), group.clone());
        }

        txn.insert_record(&self.profile.entity_type, record)?;
        txn.commit()?;
        Ok(identifier)
    }
}
