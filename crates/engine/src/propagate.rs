//! Reference propagation
//!
//! Before a record is renamed, every field elsewhere in the schema that
//! holds its old identifier is rewritten to the new one. Each reference
//! descriptor becomes one typed filter plus one set-field; a descriptor that
//! fails (stale table, missing column) is recorded and the rest still run.

use serde::Serialize;
use tracing::{debug, error, info};

use nomen_core::{
    DirectReference, EntityType, PolymorphicReference, ReferenceField, Result, RowFilter,
    Transaction,
};

/// What happened to one reference field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FieldOutcome {
    /// Rows rewritten
    Updated(usize),
    /// Rows that would be rewritten (dry run)
    WouldUpdate(usize),
    /// Field is the target's own key or lives on the target type
    Skipped,
    /// Update failed; message of the store error
    Failed(String),
}

/// Outcome for one reference field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldReport {
    /// The reference field
    pub field: ReferenceField,
    /// What happened
    pub outcome: FieldOutcome,
}

/// Per-field results of one propagation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    /// One entry per reference field, in catalog order
    pub fields: Vec<FieldReport>,
}

impl PropagationReport {
    /// Rows rewritten, or that would be rewritten in a dry run
    pub fn rows_affected(&self) -> usize {
        self.fields
            .iter()
            .map(|f| match f.outcome {
                FieldOutcome::Updated(n) | FieldOutcome::WouldUpdate(n) => n,
                _ => 0,
            })
            .sum()
    }

    /// Fields whose update failed
    pub fn failures(&self) -> impl Iterator<Item = &FieldReport> {
        self.fields
            .iter()
            .filter(|f| matches!(f.outcome, FieldOutcome::Failed(_)))
    }

    /// True when any field failed
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    fn push(&mut self, field: ReferenceField, outcome: FieldOutcome) {
        self.fields.push(FieldReport { field, outcome });
    }
}

/// Rewrites references from an old identifier to a new one
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferencePropagator;

impl ReferencePropagator {
    /// Create a propagator
    pub fn new() -> Self {
        Self
    }

    /// Retarget every reference to `old_id` of `target` at `new_id`
    ///
    /// In a dry run matching rows are only counted. Never fails as a whole;
    /// per-field errors are logged and reported.
    #[allow(clippy::too_many_arguments)]
    pub fn propagate(
        &self,
        txn: &mut dyn Transaction,
        target: &EntityType,
        old_id: &str,
        new_id: &str,
        direct: &[DirectReference],
        polymorphic: &[PolymorphicReference],
        dry_run: bool,
    ) -> PropagationReport {
        let mut report = PropagationReport::default();

        for reference in direct {
            let field = ReferenceField::Direct(reference.clone());
            if reference.is_self_identifier(target) {
                report.push(field, FieldOutcome::Skipped);
                continue;
            }
            let filter = reference.filter(old_id);
            let outcome = self.apply(txn, &filter, &reference.field, new_id, dry_run);
            self.log_outcome(&field, old_id, new_id, &outcome);
            report.push(field, outcome);
        }

        for reference in polymorphic {
            let field = ReferenceField::Polymorphic(reference.clone());
            if &reference.owner_type == target {
                report.push(field, FieldOutcome::Skipped);
                continue;
            }
            let filter = reference.filter(target, old_id);
            let outcome = self.apply(txn, &filter, &reference.value_field, new_id, dry_run);
            self.log_outcome(&field, old_id, new_id, &outcome);
            report.push(field, outcome);
        }

        report
    }

    fn apply(
        &self,
        txn: &mut dyn Transaction,
        filter: &RowFilter,
        field: &str,
        new_id: &str,
        dry_run: bool,
    ) -> FieldOutcome {
        let result: Result<FieldOutcome> = if dry_run {
            txn.count_matching(filter).map(FieldOutcome::WouldUpdate)
        } else {
            txn.update_matching(filter, field, new_id)
                .map(FieldOutcome::Updated)
        };
        result.unwrap_or_else(|e| FieldOutcome::Failed(e.to_string()))
    }

    fn log_outcome(&self, field: &ReferenceField, old_id: &str, new_id: &str, outcome: &FieldOutcome) {
        match outcome {
            FieldOutcome::Updated(n) if *n > 0 => {
                info!(target: "nomen::propagate", field = %field, old = old_id, new = new_id, rows = n, "Updated references");
            }
            FieldOutcome::WouldUpdate(n) if *n > 0 => {
                info!(target: "nomen::propagate", field = %field, old = old_id, new = new_id, rows = n, "[Dry Run] Would update references");
            }
            FieldOutcome::Failed(reason) => {
                error!(target: "nomen::propagate", field = %field, old = old_id, new = new_id, error = %reason, "Error updating reference field");
            }
            _ => debug!(target: "nomen::propagate", field = %field, old = old_id, "No references"),
        }
    }
}
