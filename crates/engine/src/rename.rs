//! Batch migration of existing identifiers
//!
//! [`RenameEngine::migrate`] walks every record of one entity type in
//! identifier order and brings its identifier in line with the naming scheme:
//!
//! ```text
//! SCANNING ─► CLASSIFYING ─┬─► already correct ─────────────────────┐
//!                          └─► GENERATING ─► PROPAGATING ─► RENAMING ┴─► RECORDED
//! ```
//!
//! # Transactions
//!
//! All writes of a page run in one transaction. After every `batch_size`
//! processed records it is committed (rolled back in a dry run) and a new one
//! begun. Numbers consumed by renamed records are pushed to the persisted
//! series counters in a separate short transaction after each commit, so the
//! page transaction never holds a counter lock while it holds the record
//! writer lock.
//!
//! # Paging
//!
//! Pages are fetched with a keyset cursor (`after` the last identifier seen).
//! A renamed record may reappear later under its new identifier; identifiers
//! issued by this run are passed over without counting them twice.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use nomen_core::limits::{DEFAULT_BATCH_SIZE, DEFAULT_PADDING, MAX_LISTED_RENAMES};
use nomen_core::{
    DirectReference, EntityType, Error, PolymorphicReference, Record, RecordStore,
    ReferenceCatalog, Result, SeriesKey, Transaction,
};

use crate::allocator::SequenceAllocator;
use crate::config::EntityProfile;
use crate::derive::{parse_sequence, KeyDeriver, NameParts};
use crate::propagate::{PropagationReport, ReferencePropagator};

/// Cooperative cancellation flag, checked between pages
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop after the current page
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`StopSignal::stop`] was called
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one migration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Records per page and per checkpoint
    pub batch_size: usize,
    /// Report what would change without writing
    pub dry_run: bool,
    /// Minimum sequence width
    pub padding: usize,
    /// Renamed records kept in `MigrationSummary::outcomes`; the rest are only counted
    pub max_listed_renames: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            padding: DEFAULT_PADDING,
            max_listed_renames: MAX_LISTED_RENAMES,
        }
    }
}

/// Classification of one processed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Identifier already follows the scheme
    AlreadyCorrect,
    /// Renamed (or would be, in a dry run)
    Renamed,
    /// Not migrated and not an error
    Skipped,
    /// Migration of this record failed
    Failed,
}

/// Result of processing one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    /// Classification
    pub kind: OutcomeKind,
    /// Identifier before the run
    pub old_id: String,
    /// Target identifier, when one was generated
    pub new_id: Option<String>,
    /// Error or skip reason
    pub detail: Option<String>,
    /// True when references point at `new_id` but the record kept `old_id`
    pub critical: bool,
    /// Reference rewrites, when propagation ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation: Option<PropagationReport>,
}

impl MigrationOutcome {
    fn new(kind: OutcomeKind, old_id: &str) -> Self {
        Self {
            kind,
            old_id: old_id.to_string(),
            new_id: None,
            detail: None,
            critical: false,
            propagation: None,
        }
    }

    fn to(mut self, new_id: &str) -> Self {
        self.new_id = Some(new_id.to_string());
        self
    }

    fn because(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Totals of one migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    /// Entity type migrated
    pub entity_type: EntityType,
    /// Whether writes were suppressed
    pub dry_run: bool,
    /// Records examined
    pub processed: usize,
    /// Records already following the scheme
    pub already_correct: usize,
    /// Records renamed (or that would be)
    pub renamed: usize,
    /// Records passed over
    pub skipped: usize,
    /// Records whose migration failed
    pub failed: usize,
    /// Run stopped early on request
    pub cancelled: bool,
    /// Records left inconsistent: references moved, rename failed
    pub critical: Vec<MigrationOutcome>,
    /// Failed and skipped outcomes, plus renames up to the listing limit,
    /// in processing order
    pub outcomes: Vec<MigrationOutcome>,
    /// Renames counted but left out of `outcomes`
    pub unlisted_renames: usize,
}

impl MigrationSummary {
    fn new(entity_type: EntityType, dry_run: bool) -> Self {
        Self {
            entity_type,
            dry_run,
            processed: 0,
            already_correct: 0,
            renamed: 0,
            skipped: 0,
            failed: 0,
            cancelled: false,
            critical: Vec::new(),
            outcomes: Vec::new(),
            unlisted_renames: 0,
        }
    }

    /// True when no record failed
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, outcome: MigrationOutcome, max_listed_renames: usize) {
        match outcome.kind {
            OutcomeKind::AlreadyCorrect => {
                self.already_correct += 1;
                return;
            }
            OutcomeKind::Renamed => {
                self.renamed += 1;
                if self.renamed > max_listed_renames {
                    self.unlisted_renames += 1;
                    return;
                }
            }
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
        if outcome.critical {
            self.critical.push(outcome.clone());
        }
        self.outcomes.push(outcome);
    }
}

#[derive(Default)]
struct RunState {
    /// Highest sequence handed out per combined prefix
    sequences: HashMap<String, i64>,
    /// Identifiers given to renamed records
    issued: HashSet<String>,
    /// Counter floors not yet pushed to the store
    pending_floors: BTreeMap<SeriesKey, i64>,
}

/// Migrates the identifiers of one entity type
pub struct RenameEngine<'a> {
    store: &'a dyn RecordStore,
    catalog: &'a dyn ReferenceCatalog,
    deriver: &'a KeyDeriver,
    allocator: SequenceAllocator,
    propagator: ReferencePropagator,
    stop: StopSignal,
}

impl<'a> RenameEngine<'a> {
    /// Create an engine over a store, a reference catalog, and a deriver
    pub fn new(
        store: &'a dyn RecordStore,
        catalog: &'a dyn ReferenceCatalog,
        deriver: &'a KeyDeriver,
    ) -> Self {
        Self {
            store,
            catalog,
            deriver,
            allocator: SequenceAllocator::new(),
            propagator: ReferencePropagator::new(),
            stop: StopSignal::new(),
        }
    }

    /// Use an externally controlled stop signal
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Handle for stopping the run between pages
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Migrate every record of `profile.entity_type`
    ///
    /// Per-record problems are counted in the summary; the run goes on.
    ///
    /// # Errors
    ///
    /// Fatal only: the reference catalog cannot be read, a page cannot be
    /// fetched (`PageFetch`), or a checkpoint cannot be committed.
    pub fn migrate(
        &self,
        profile: &EntityProfile,
        options: &MigrationOptions,
    ) -> Result<MigrationSummary> {
        let entity_type = &profile.entity_type;
        let batch_size = options.batch_size.max(1);
        info!(
            target: "nomen::rename",
            entity_type = %entity_type,
            dry_run = options.dry_run,
            batch_size,
            "Starting identifier migration"
        );

        let direct = self.catalog.list_direct_references(entity_type)?;
        let polymorphic = self.catalog.list_polymorphic_references()?;
        info!(
            target: "nomen::rename",
            direct = direct.len(),
            polymorphic = polymorphic.len(),
            "Discovered reference fields"
        );

        let mut summary = MigrationSummary::new(entity_type.clone(), options.dry_run);
        let mut run = RunState::default();
        let mut txn = self.begin()?;
        let mut cursor: Option<String> = None;

        loop {
            if self.stop.is_stopped() {
                warn!(target: "nomen::rename", processed = summary.processed, "Migration stopped on request");
                summary.cancelled = true;
                break;
            }

            debug!(target: "nomen::rename", after = ?cursor, "Fetching page");
            let page = match txn.list_page(entity_type, cursor.as_deref(), batch_size) {
                Ok(page) => page,
                Err(e) => {
                    error!(target: "nomen::rename", after = ?cursor, error = %e, "Could not fetch page; aborting");
                    self.finish(txn, &mut run, options, summary.processed)?;
                    return Err(Error::PageFetch {
                        entity_type: entity_type.clone(),
                        after: cursor,
                        source: Box::new(e),
                    });
                }
            };
            let Some(last) = page.last() else { break };
            cursor = Some(last.identifier.clone());

            for record in &page {
                if run.issued.contains(&record.identifier) {
                    continue;
                }
                summary.processed += 1;
                let outcome = self.process_record(
                    txn.as_mut(),
                    profile,
                    options,
                    record,
                    &direct,
                    &polymorphic,
                    &mut run,
                );
                summary.record(outcome, options.max_listed_renames);

                if summary.processed % batch_size == 0 {
                    self.finish(txn, &mut run, options, summary.processed)?;
                    txn = self.begin()?;
                }
            }
        }

        self.finish(txn, &mut run, options, summary.processed)?;
        self.log_summary(&summary);
        Ok(summary)
    }

    fn begin(&self) -> Result<Box<dyn Transaction + 'a>> {
        let store: &'a dyn RecordStore = self.store;
        store.begin()
    }

    /// Commit (or roll back in a dry run) and push pending counter floors
    fn finish(
        &self,
        txn: Box<dyn Transaction + 'a>,
        run: &mut RunState,
        options: &MigrationOptions,
        processed: usize,
    ) -> Result<()> {
        if options.dry_run {
            info!(target: "nomen::rename", processed, "[Dry Run] Would commit");
            return txn.rollback();
        }
        txn.commit()?;
        info!(target: "nomen::rename", processed, "Committed");
        self.push_floors(run);
        Ok(())
    }

    fn push_floors(&self, run: &mut RunState) {
        if run.pending_floors.is_empty() {
            return;
        }
        let result = self.begin().and_then(|mut txn| {
            for (series_key, floor) in &run.pending_floors {
                self.allocator.advance_to(txn.as_mut(), series_key, *floor)?;
            }
            txn.commit()
        });
        match result {
            Ok(()) => run.pending_floors.clear(),
            Err(e) => {
                // Kept for the next checkpoint.
                error!(
                    target: "nomen::rename",
                    series = run.pending_floors.len(),
                    error = %e,
                    "Could not advance series counters"
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_record(
        &self,
        txn: &mut dyn Transaction,
        profile: &EntityProfile,
        options: &MigrationOptions,
        record: &Record,
        direct: &[DirectReference],
        polymorphic: &[PolymorphicReference],
        run: &mut RunState,
    ) -> MigrationOutcome {
        let old_id = record.identifier.as_str();
        let name = record
            .get(&profile.name_field)
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let group = record.get(&profile.group_field);

        let parts = self.deriver.name_parts(name.unwrap_or_default(), group);
        if parts.matches(old_id, options.padding) {
            debug!(target: "nomen::rename", id = old_id, "Already correct");
            return MigrationOutcome::new(OutcomeKind::AlreadyCorrect, old_id);
        }

        if name.is_none() {
            let err = Error::MissingDisplayName {
                entity_type: profile.entity_type.clone(),
            };
            error!(target: "nomen::rename", id = old_id, error = %err, "Could not generate identifier");
            return MigrationOutcome::new(OutcomeKind::Failed, old_id).because(err.to_string());
        }

        let sequence = match self.next_sequence(txn, &profile.entity_type, &parts, run) {
            Ok(sequence) => sequence,
            Err(e) => {
                error!(target: "nomen::rename", id = old_id, error = %e, "Could not generate identifier");
                return MigrationOutcome::new(OutcomeKind::Failed, old_id).because(e.to_string());
            }
        };
        let new_id = parts.identifier(sequence, options.padding).into_string();

        if new_id == old_id {
            warn!(target: "nomen::rename", id = old_id, "Generated identifier equals the current one");
            return MigrationOutcome::new(OutcomeKind::Skipped, old_id)
                .to(&new_id)
                .because("generated identifier equals the current one");
        }

        let report = self.propagator.propagate(
            txn,
            &profile.entity_type,
            old_id,
            &new_id,
            direct,
            polymorphic,
            options.dry_run,
        );

        let mut outcome = if options.dry_run {
            info!(target: "nomen::rename", old = old_id, new = %new_id, "[Dry Run] Would rename");
            MigrationOutcome::new(OutcomeKind::Renamed, old_id).to(&new_id)
        } else {
            match txn.rename_record(&profile.entity_type, old_id, &new_id) {
                Ok(()) => {
                    info!(target: "nomen::rename", old = old_id, new = %new_id, "Renamed");
                    run.issued.insert(new_id.clone());
                    let floor = run
                        .pending_floors
                        .entry(parts.series_key(&profile.type_tag))
                        .or_insert(sequence);
                    *floor = (*floor).max(sequence);
                    MigrationOutcome::new(OutcomeKind::Renamed, old_id).to(&new_id)
                }
                Err(e) => {
                    error!(
                        target: "nomen::rename",
                        critical = true,
                        old = old_id,
                        new = %new_id,
                        error = %e,
                        "Rename failed after references were updated; manual repair required"
                    );
                    let mut failed = MigrationOutcome::new(OutcomeKind::Failed, old_id)
                        .to(&new_id)
                        .because(e.to_string());
                    failed.critical = true;
                    failed
                }
            }
        };
        outcome.propagation = Some(report);
        outcome
    }

    /// Next number for the combined prefix: cached, else scanned maximum, plus one
    fn next_sequence(
        &self,
        txn: &mut dyn Transaction,
        entity_type: &EntityType,
        parts: &NameParts,
        run: &mut RunState,
    ) -> Result<i64> {
        let combined = parts.combined();
        let last = match run.sequences.get(&combined) {
            Some(last) => *last,
            None => txn
                .identifiers_with_prefix(entity_type, &combined)?
                .iter()
                .filter_map(|id| parse_sequence(id, &combined))
                .max()
                .unwrap_or(0),
        };
        let next = last
            .checked_add(1)
            .ok_or_else(|| Error::SequenceExhausted(combined.clone()))?;
        run.sequences.insert(combined, next);
        Ok(next)
    }

    fn log_summary(&self, summary: &MigrationSummary) {
        info!(
            target: "nomen::rename",
            entity_type = %summary.entity_type,
            dry_run = summary.dry_run,
            processed = summary.processed,
            already_correct = summary.already_correct,
            renamed = summary.renamed,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Migration finished"
        );
        for outcome in &summary.critical {
            error!(
                target: "nomen::rename",
                critical = true,
                old = %outcome.old_id,
                new = ?outcome.new_id,
                "Inconsistent record: references point at the new identifier"
            );
        }
    }
}
