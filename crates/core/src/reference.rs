//! Reference descriptors and row filters
//!
//! A reference descriptor names one place where an identifier of some target
//! type may be stored. Descriptors are read-only metadata supplied by a
//! [`ReferenceCatalog`](crate::traits::ReferenceCatalog).
//!
//! Updates are never expressed as query strings. A descriptor is lowered to a
//! [`RowFilter`] plus the field to overwrite, and the store executes that
//! through its generic `update_matching` / `count_matching` operations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::limits::IDENTIFIER_FIELD;
use crate::types::{EntityType, Record};

/// A field that always points at one fixed target type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectReference {
    /// Entity type owning the field
    pub owner_type: EntityType,
    /// Field holding the target identifier
    pub field: String,
}

impl DirectReference {
    /// Create a direct reference descriptor
    pub fn new(owner_type: impl Into<EntityType>, field: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            field: field.into(),
        }
    }

    /// True when this descriptor is the target's own primary key
    pub fn is_self_identifier(&self, target: &EntityType) -> bool {
        &self.owner_type == target && self.field == IDENTIFIER_FIELD
    }

    /// Filter selecting rows that hold `old_id`
    pub fn filter(&self, old_id: &str) -> RowFilter {
        RowFilter::new(self.owner_type.clone()).eq(&self.field, old_id)
    }
}

/// A field pair whose target type varies at runtime
///
/// `value_field` holds an identifier only when `type_field` equals the
/// target type's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolymorphicReference {
    /// Entity type owning the field pair
    pub owner_type: EntityType,
    /// Field holding the identifier
    pub value_field: String,
    /// Field holding the target type name
    pub type_field: String,
}

impl PolymorphicReference {
    /// Create a polymorphic reference descriptor
    pub fn new(
        owner_type: impl Into<EntityType>,
        value_field: impl Into<String>,
        type_field: impl Into<String>,
    ) -> Self {
        Self {
            owner_type: owner_type.into(),
            value_field: value_field.into(),
            type_field: type_field.into(),
        }
    }

    /// Filter selecting rows that point at `old_id` of `target`
    pub fn filter(&self, target: &EntityType, old_id: &str) -> RowFilter {
        RowFilter::new(self.owner_type.clone())
            .eq(&self.type_field, target.as_str())
            .eq(&self.value_field, old_id)
    }
}

/// Either kind of reference, used when reporting per-field outcomes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceField {
    /// Direct foreign-key field
    Direct(DirectReference),
    /// Polymorphic type + value pair
    Polymorphic(PolymorphicReference),
}

impl ReferenceField {
    /// Entity type owning the field
    pub fn owner_type(&self) -> &EntityType {
        match self {
            ReferenceField::Direct(r) => &r.owner_type,
            ReferenceField::Polymorphic(r) => &r.owner_type,
        }
    }

    /// Field that gets rewritten
    pub fn value_field(&self) -> &str {
        match self {
            ReferenceField::Direct(r) => &r.field,
            ReferenceField::Polymorphic(r) => &r.value_field,
        }
    }
}

impl fmt::Display for ReferenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceField::Direct(r) => write!(f, "{}.{}", r.owner_type, r.field),
            ReferenceField::Polymorphic(r) => {
                write!(f, "{}.{} ({})", r.owner_type, r.value_field, r.type_field)
            }
        }
    }
}

/// A single predicate over one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Field equals value exactly; null never matches
    Eq {
        /// Field name
        field: String,
        /// Expected value
        value: String,
    },
    /// Field differs from value; null always matches
    NotEq {
        /// Field name
        field: String,
        /// Excluded value
        value: String,
    },
    /// Field equals value after trimming and lowercasing both sides
    EqNormalized {
        /// Field name
        field: String,
        /// Expected value (normalized on construction)
        value: String,
    },
}

impl Condition {
    /// Field the condition reads
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. }
            | Condition::NotEq { field, .. }
            | Condition::EqNormalized { field, .. } => field,
        }
    }

    fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::Eq { field, value } => record.get(field) == Some(value.as_str()),
            Condition::NotEq { field, value } => record.get(field) != Some(value.as_str()),
            Condition::EqNormalized { field, value } => record
                .get(field)
                .map(|v| normalize_name(v) == *value)
                .unwrap_or(false),
        }
    }
}

/// Conjunction of conditions over one entity type's rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    /// Table the filter applies to
    pub table: EntityType,
    /// All conditions must hold
    pub conditions: Vec<Condition>,
}

impl RowFilter {
    /// Filter matching every row of `table`
    pub fn new(table: EntityType) -> Self {
        Self {
            table,
            conditions: Vec::new(),
        }
    }

    /// Add an exact-equality condition
    pub fn eq(mut self, field: &str, value: &str) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Add an inequality condition
    pub fn not_eq(mut self, field: &str, value: &str) -> Self {
        self.conditions.push(Condition::NotEq {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Add a case- and whitespace-insensitive equality condition
    pub fn eq_normalized(mut self, field: &str, value: &str) -> Self {
        self.conditions.push(Condition::EqNormalized {
            field: field.to_string(),
            value: normalize_name(value),
        });
        self
    }

    /// Fields referenced by the filter, in condition order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(Condition::field)
    }

    /// Evaluate the filter against a record of `self.table`
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// Normalize a display name for duplicate detection: trim, then lowercase
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
