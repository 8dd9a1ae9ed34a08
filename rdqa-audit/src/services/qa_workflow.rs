//! QA workflow
//!
//! Per (identifier, deviationString) the checklist moves through
//! Surfaced → Checklisted → Reviewed → Promoted | Retained.
//!
//! - **stage**: copy identifiers that passed raw validation from intake to
//!   the QA holding area and record them in the file record
//! - **run**: surface passed identifiers into the checklist, promote rows
//!   with `qa` and `localMove` both set, rewrite the checklist
//!
//! An identifier is recorded as validated once: further approved rows for
//! it (other deviation strings) are closed without a second record.
//!
//! Rows already in the checklist are never reset. A surfaced row missing
//! from the checklist (deleted, or dropped as malformed) is recreated with
//! cleared flags.

use crate::models::{
    FileRecordRow, Identifier, Layout, PendingFileRow, QaChecklistEntry, ValidatedFileRow,
};
use crate::services::dataset_scanner::{identifier_files, prune_empty_dirs};
use crate::services::record_store::Ledger;
use crate::services::validation_pass::latest_pending_files;
use crate::AuditContext;
use rdqa_common::{Result, RunContext};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of the staging step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Identifiers copied into the holding area
    pub staged: Vec<String>,
    /// Passed identifiers with no files left in intake
    pub skipped: Vec<String>,
}

/// Result of one QA pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QaOutcome {
    /// Rows created (new or self-healed)
    pub added: usize,
    /// Malformed rows dropped while loading
    pub dropped: usize,
    /// Identifiers promoted to the archive
    pub promoted: Vec<String>,
    /// Rows left in the checklist
    pub retained: usize,
}

/// Where an approved row's files ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Promotion {
    /// Moved from holding into the archive by this call
    Moved,
    /// Holding already empty, files found in the archive
    AlreadyArchived,
    /// In neither place
    Missing,
}

pub struct QaWorkflow<'a> {
    ctx: &'a AuditContext,
    run: &'a RunContext,
}

impl<'a> QaWorkflow<'a> {
    pub fn new(ctx: &'a AuditContext, run: &'a RunContext) -> Self {
        Self { ctx, run }
    }

    /// Rows of the newest pending-files snapshot (empty when none exists)
    fn latest_pending(&self) -> Result<Vec<PendingFileRow>> {
        match latest_pending_files(&self.ctx.paths.pending)? {
            Some(path) => {
                debug!(snapshot = %path.display(), "Using pending-files snapshot");
                Ledger::<PendingFileRow>::new(path).load()
            }
            None => {
                info!("No pending-files snapshot yet, run the raw pass first");
                Ok(Vec::new())
            }
        }
    }

    fn parse(&self, identifier: &str) -> Option<Identifier> {
        match self.ctx.grammar.parse(identifier) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Skipping ledger row: {}", e);
                None
            }
        }
    }

    /// Copy passed identifiers not yet in the file record into the holding area
    pub fn stage(&self) -> Result<StageOutcome> {
        let paths = &self.ctx.paths;
        info!(target_dir = %paths.pending_qa.display(), "Starting QA staging");

        let record = Ledger::<FileRecordRow>::new(&paths.file_record);
        let recorded: HashSet<String> = record.load()?.into_iter().map(|r| r.identifier).collect();

        let mut outcome = StageOutcome::default();
        let mut new_rows = Vec::new();
        for row in self.latest_pending()? {
            if !row.pass_raw || recorded.contains(&row.identifier) {
                continue;
            }
            let Some(id) = self.parse(&row.identifier) else {
                continue;
            };

            let source = Layout::Intake.directory(&paths.raw, &id, &row.data_type);
            let files = identifier_files(&source, &id)?;
            if files.is_empty() {
                warn!(identifier = %id, "No intake files to stage");
                outcome.skipped.push(row.identifier.clone());
                continue;
            }

            let target = Layout::Intake.directory(&paths.pending_qa, &id, &row.data_type);
            fs::create_dir_all(&target)?;
            for file in &files {
                let destination = target.join(file_name(file));
                fs::copy(file, &destination)?;
                info!(identifier = %id, from = %file.display(), to = %destination.display(), "Staged file");
            }

            new_rows.push(FileRecordRow::staged(&row, self.run));
            outcome.staged.push(row.identifier);
        }

        record.append(new_rows)?;
        info!(
            staged = outcome.staged.len(),
            skipped = outcome.skipped.len(),
            "QA staging complete"
        );
        Ok(outcome)
    }

    /// Surface, promote and rewrite the checklist
    pub fn run(&self) -> Result<QaOutcome> {
        let paths = &self.ctx.paths;
        info!(checklist = %paths.qa_checklist.display(), "Starting QA pass");

        let checklist = Ledger::<QaChecklistEntry>::new(&paths.qa_checklist);
        if checklist.ensure_exists()? {
            info!("Created empty QA checklist");
        }
        let (loaded, dropped) = checklist.load_lenient()?;

        let mut keys: HashSet<(String, String)> = HashSet::new();
        let mut entries: Vec<QaChecklistEntry> = Vec::with_capacity(loaded.len());
        for entry in loaded {
            let key = (entry.identifier.clone(), entry.deviation_string.clone());
            if keys.insert(key) {
                entries.push(entry);
            } else {
                warn!(identifier = %entry.identifier, "Duplicate checklist row dropped");
            }
        }

        let validated_ledger = Ledger::<ValidatedFileRow>::new(&paths.validated_file_record);
        let mut validated: HashSet<String> = validated_ledger
            .load()?
            .into_iter()
            .map(|r| r.identifier)
            .collect();

        let mut outcome = QaOutcome {
            dropped,
            ..QaOutcome::default()
        };
        for row in self.latest_pending()? {
            if !row.pass_raw || validated.contains(&row.identifier) {
                continue;
            }
            let key = (row.identifier.clone(), row.deviation_string.clone());
            if keys.insert(key) {
                debug!(identifier = %row.identifier, "Checklist row added");
                entries.push(QaChecklistEntry::surfaced(&row, self.run));
                outcome.added += 1;
            }
        }

        let mut remaining = Vec::with_capacity(entries.len());
        let mut promoted_rows = Vec::new();
        let mut promoted: BTreeSet<String> = BTreeSet::new();
        for entry in entries {
            if !entry.is_approved() {
                remaining.push(entry);
                continue;
            }
            match self.promote(&entry)? {
                Promotion::Missing => remaining.push(entry),
                Promotion::AlreadyArchived if validated.contains(&entry.identifier) => {
                    // Sibling deviation row of an identifier already recorded
                    info!(
                        identifier = %entry.identifier,
                        deviation = %entry.deviation_string,
                        "Approved row closed, identifier already validated"
                    );
                }
                Promotion::Moved | Promotion::AlreadyArchived => {
                    promoted_rows.push(ValidatedFileRow::promoted(&entry, self.run));
                    validated.insert(entry.identifier.clone());
                    promoted.insert(entry.identifier);
                }
            }
        }

        validated_ledger.append(promoted_rows)?;
        outcome.retained = remaining.len();
        checklist.rewrite(remaining)?;

        if !promoted.is_empty() {
            let pruned = prune_empty_dirs(&paths.pending_qa)?;
            debug!(pruned, "Pruned empty holding directories");
        }
        outcome.promoted = promoted.into_iter().collect();

        info!(
            added = outcome.added,
            promoted = outcome.promoted.len(),
            retained = outcome.retained,
            dropped = outcome.dropped,
            "QA pass complete"
        );
        Ok(outcome)
    }

    /// Move an approved identifier's files from holding to the archive
    ///
    /// `Missing` (row retained) when the files are in neither place.
    fn promote(&self, entry: &QaChecklistEntry) -> Result<Promotion> {
        let paths = &self.ctx.paths;
        let Some(id) = self.parse(&entry.identifier) else {
            return Ok(Promotion::Missing);
        };

        let holding = Layout::Intake.directory(&paths.pending_qa, &id, &entry.data_type);
        let archive = Layout::Archive.directory(&paths.checked, &id, &entry.data_type);

        let files = identifier_files(&holding, &id)?;
        if files.is_empty() {
            if !identifier_files(&archive, &id)?.is_empty() {
                debug!(identifier = %id, "Already in archive");
                return Ok(Promotion::AlreadyArchived);
            }
            warn!(identifier = %id, holding = %holding.display(), "Approved but no files to promote");
            return Ok(Promotion::Missing);
        }

        fs::create_dir_all(&archive)?;
        for file in &files {
            let destination = archive.join(file_name(file));
            move_file(file, &destination)?;
            info!(identifier = %id, from = %file.display(), to = %destination.display(), "Promoted file");
        }
        Ok(Promotion::Moved)
    }
}

fn file_name(path: &Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_default()
}

/// Rename, falling back to copy + remove across filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}
