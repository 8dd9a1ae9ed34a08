//! Raw and checked validation passes
//!
//! Both passes run the tree differ and the content validators over one
//! layout root and apply the ignore-before filter. The raw pass then writes
//! the pending-files / pending-errors snapshot pair; the checked pass purges
//! failing identifiers from the archive.

use crate::models::{
    FileRecordRow, Identifier, Layout, LedgerRow, PendingErrorRow, PendingFileRow, ValidatedFileRow,
};
use crate::services::dataset_scanner::prune_empty_dirs;
use crate::services::record_store::{snapshots, Ledger};
use crate::services::tree_differ::{DiffOutcome, FileGroup, TreeDiffer};
use crate::types::{ValidationError, ValidationReport};
use crate::validators::{validator_for, ContentCheckError, ContentValidator};
use crate::AuditContext;
use chrono::{DateTime, Local, NaiveDate};
use rayon::prelude::*;
use rdqa_common::{Result, RunContext};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Snapshot filename prefix for per-identifier pass results
pub const PENDING_FILES_PREFIX: &str = "pending-files";

/// Snapshot filename prefix for the error report
pub const PENDING_ERRORS_PREFIX: &str = "pending-errors";

/// Result of a raw pass
#[derive(Debug, Clone)]
pub struct RawPassOutcome {
    pub report: ValidationReport,
    pub pending_files: PathBuf,
    pub pending_errors: PathBuf,
    /// Rows written to the pending-files snapshot
    pub identifiers: usize,
    /// Rows with passRaw set
    pub passed: usize,
}

/// Result of a checked pass
#[derive(Debug, Clone)]
pub struct CheckedPassOutcome {
    pub report: ValidationReport,
    /// Identifiers whose archive files were deleted
    pub purged: Vec<Identifier>,
}

pub struct ValidationPass<'a> {
    ctx: &'a AuditContext,
    run: &'a RunContext,
    ignore_before: Option<NaiveDate>,
}

impl<'a> ValidationPass<'a> {
    pub fn new(ctx: &'a AuditContext, run: &'a RunContext) -> Self {
        Self {
            ctx,
            run,
            ignore_before: ctx.config.ignore_before,
        }
    }

    /// Override the configured ignore-before date
    pub fn ignore_before(mut self, date: Option<NaiveDate>) -> Self {
        if date.is_some() {
            self.ignore_before = date;
        }
        self
    }

    /// Diff, content checks and ignore-before filter over one root
    pub fn audit(&self, root: &Path, layout: Layout) -> Result<DiffOutcome> {
        let differ = TreeDiffer::new(
            &self.ctx.dictionary,
            &self.ctx.grammar,
            &self.ctx.config.visit_data_types,
            layout,
        )
        .parallel(self.ctx.config.parallel);

        let mut outcome = differ.diff(root)?;
        self.run_content_checks(root, &mut outcome)?;

        if let Some(before) = self.ignore_before {
            let dropped = filter_ignored(&mut outcome.report, before);
            if dropped > 0 {
                info!(dropped, before = %before, "Ignored errors for files modified before cutoff");
            }
        }
        outcome.report.normalize();
        Ok(outcome)
    }

    fn run_content_checks(&self, root: &Path, outcome: &mut DiffOutcome) -> Result<()> {
        let validators: BTreeMap<&str, Box<dyn ContentValidator>> = self
            .ctx
            .config
            .content_checks
            .iter()
            .map(|(data_type, check)| (data_type.as_str(), validator_for(*check, &self.ctx.grammar)))
            .collect();

        let targets: Vec<(&FileGroup, &dyn ContentValidator)> = outcome
            .groups
            .values()
            .filter(|group| group.has_data())
            .filter_map(|group| {
                validators
                    .get(group.data_type.as_str())
                    .map(|v| (group, v.as_ref()))
            })
            .collect();

        let found: Vec<Vec<ValidationError>> = if self.ctx.config.parallel {
            targets
                .par_iter()
                .map(|(group, validator)| check_group(root, group, *validator))
                .collect::<std::result::Result<_, _>>()?
        } else {
            targets
                .iter()
                .map(|(group, validator)| check_group(root, group, *validator))
                .collect::<std::result::Result<_, _>>()?
        };

        let count: usize = found.iter().map(Vec::len).sum();
        debug!(checked = targets.len(), errors = count, "Content checks complete");
        outcome.report.extend(found.into_iter().flatten());
        Ok(())
    }

    /// Validate the intake area and write the pending snapshot pair
    pub fn raw(&self) -> Result<RawPassOutcome> {
        let paths = &self.ctx.paths;
        info!(root = %paths.raw.display(), "Starting raw validation pass");

        let outcome = self.audit(&paths.raw, Layout::Intake)?;
        let failed = outcome.report.failed_identifiers();

        let mut file_rows = Vec::new();
        for id in outcome.identifiers() {
            let Some(entry) = self.ctx.dictionary.entry(id.variable()) else {
                continue;
            };
            let group = outcome.groups.get(&id);
            let pass_raw = group.is_some() && !failed.contains(&id);
            let deviation = group.map(FileGroup::deviation_string).unwrap_or_default();
            file_rows.push(PendingFileRow::new(self.run, &id, entry, pass_raw, deviation));
        }
        let passed = file_rows.iter().filter(|r| r.pass_raw).count();
        let identifiers = file_rows.len();

        let error_rows: Vec<PendingErrorRow> = outcome
            .report
            .errors()
            .iter()
            .map(|e| self.error_row(e))
            .collect();

        let pending_files = paths
            .pending
            .join(self.run.stamped_filename(PENDING_FILES_PREFIX, "csv"));
        let pending_errors = paths
            .pending
            .join(self.run.stamped_filename(PENDING_ERRORS_PREFIX, "csv"));
        // pending-files last: it is only read once its errors partner exists
        Ledger::<PendingErrorRow>::new(&pending_errors).rewrite(error_rows)?;
        Ledger::<PendingFileRow>::new(&pending_files).rewrite(file_rows)?;

        info!(
            identifiers,
            passed,
            errors = outcome.report.len(),
            snapshot = %pending_files.display(),
            "Raw validation pass complete"
        );

        Ok(RawPassOutcome {
            report: outcome.report,
            pending_files,
            pending_errors,
            identifiers,
            passed,
        })
    }

    /// Validate the archive and purge failing identifiers when configured
    pub fn checked(&self) -> Result<CheckedPassOutcome> {
        let paths = &self.ctx.paths;
        info!(root = %paths.checked.display(), "Starting checked validation pass");

        let outcome = self.audit(&paths.checked, Layout::Archive)?;
        let failed: Vec<Identifier> = outcome
            .report
            .failed_identifiers()
            .into_iter()
            .filter(|id| outcome.groups.contains_key(id))
            .collect();

        let purged = if failed.is_empty() {
            Vec::new()
        } else if self.ctx.config.purge_failed_checked {
            self.purge(&outcome, &failed)?;
            failed
        } else {
            warn!(count = failed.len(), "Archive identifiers failing validation, purge disabled");
            Vec::new()
        };

        info!(
            errors = outcome.report.len(),
            purged = purged.len(),
            "Checked validation pass complete"
        );
        Ok(CheckedPassOutcome {
            report: outcome.report,
            purged,
        })
    }

    fn purge(&self, outcome: &DiffOutcome, failed: &[Identifier]) -> Result<()> {
        let paths = &self.ctx.paths;
        for id in failed {
            let Some(group) = outcome.groups.get(id) else {
                continue;
            };
            for path in group.all_paths(&paths.checked) {
                if path.is_file() {
                    fs::remove_file(&path)?;
                    info!(identifier = %id, path = %path.display(), "Purged failing archive file");
                }
            }
        }

        // Forget the identifiers so staging copies them again from intake
        let names: BTreeSet<String> = failed.iter().map(Identifier::to_string).collect();
        let validated = drop_rows(&Ledger::<ValidatedFileRow>::new(&paths.validated_file_record), &names)?;
        let recorded = drop_rows(&Ledger::<FileRecordRow>::new(&paths.file_record), &names)?;
        info!(validated, recorded, "Dropped purged identifiers from ledgers");

        let pruned = prune_empty_dirs(&paths.checked)?;
        debug!(pruned, "Pruned empty archive directories");
        Ok(())
    }

    fn error_row(&self, error: &ValidationError) -> PendingErrorRow {
        PendingErrorRow {
            datetime: self.run.timestamp().to_string(),
            user: self.run.user().to_string(),
            identifier: error
                .identifier
                .as_ref()
                .map(Identifier::to_string)
                .unwrap_or_default(),
            error_type: error.kind.as_str().to_string(),
            error_details: error.message.clone(),
            path: error
                .path
                .as_ref()
                .map(|p| {
                    p.strip_prefix(&self.ctx.paths.root)
                        .unwrap_or(p)
                        .display()
                        .to_string()
                })
                .unwrap_or_default(),
        }
    }
}

/// Newest pending-files snapshot whose pending-errors partner was written
///
/// A run aborted between the two writes leaves an unpaired snapshot, which
/// is skipped.
pub fn latest_pending_files(dir: &Path) -> Result<Option<PathBuf>> {
    for (stamp, path) in snapshots(dir, PENDING_FILES_PREFIX)?.into_iter().rev() {
        let partner = dir.join(format!("{}-{}.csv", PENDING_ERRORS_PREFIX, stamp));
        if partner.is_file() {
            return Ok(Some(path));
        }
        warn!(snapshot = %path.display(), "Skipping pending-files snapshot without its errors partner");
    }
    Ok(None)
}

/// Remove rows naming any of `names`; returns the count removed
fn drop_rows<R: LedgerRow>(ledger: &Ledger<R>, names: &BTreeSet<String>) -> Result<usize> {
    if !ledger.exists() {
        return Ok(0);
    }
    let rows = ledger.load()?;
    let before = rows.len();
    let kept: Vec<R> = rows.into_iter().filter(|r| !names.contains(r.identifier())).collect();
    let removed = before - kept.len();
    if removed > 0 {
        ledger.rewrite(kept)?;
    }
    Ok(removed)
}

fn check_group(
    root: &Path,
    group: &FileGroup,
    validator: &dyn ContentValidator,
) -> std::result::Result<Vec<ValidationError>, ContentCheckError> {
    debug!(validator = validator.name(), directory = %group.directory.display(), "Content check");
    validator.validate(&group.data_paths(root))
}

/// Drop findings on files last modified before `before`; returns the count dropped
///
/// Findings without a path, or whose path cannot be stat'ed (missing files),
/// are kept.
pub fn filter_ignored(report: &mut ValidationReport, before: NaiveDate) -> usize {
    let initial = report.len();
    report.retain(|error| match error.path.as_deref().and_then(modified_date) {
        Some(date) => date >= before,
        None => true,
    });
    initial - report.len()
}

fn modified_date(path: &Path) -> Option<NaiveDate> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).date_naive())
}
