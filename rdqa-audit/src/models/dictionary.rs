//! Data dictionary lookup
//!
//! Columns: `variable, dataType, expectedFileExt, encrypted, provenance`.
//! Extra columns (description, detail, ...) are ignored.
//!
//! Provenance carries two structured forms:
//! - `variables: a, b`             → combination row (exactly one member per visit)
//! - `visit: v; tasks: t1, t2`     → status-tracking row linking a visit to its tasks

use crate::models::records::parse_flag;
use crate::services::record_store::write_atomic;
use rdqa_common::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Columns every dictionary must carry
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "variable",
    "dataType",
    "expectedFileExt",
    "encrypted",
    "provenance",
];

/// One dictionary row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub variable: String,
    pub data_type: String,
    /// Ordered, duplicate-free
    pub expected_file_extensions: Vec<String>,
    pub encrypted: bool,
    pub provenance: String,
}

/// Alternative variables jointly satisfying one logical task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationRow {
    pub name: String,
    pub members: Vec<String>,
}

/// Result of comparing the dictionary with its accepted snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftStatus {
    /// No snapshot existed; one was written
    SnapshotCreated,
    /// Dictionary matches the snapshot
    Unchanged,
    /// Dictionary changed and the change was accepted
    Accepted,
}

/// Read-only variable lookup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataDictionary {
    entries: Vec<DictionaryEntry>,
    index: HashMap<String, usize>,
    combinations: Vec<CombinationRow>,
    visits: BTreeMap<String, Vec<String>>,
}

impl DataDictionary {
    /// Load the dictionary CSV; a missing file is a configuration fault
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "Data dictionary not found: {}",
                path.display()
            )));
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file).map_err(|e| match e {
            Error::Schema(msg) => Error::Schema(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse a dictionary from any CSV source
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = csv.headers()?.clone();

        let mut columns = [0usize; 5];
        for (slot, name) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| Error::Schema(format!("data dictionary is missing column '{}'", name)))?;
        }

        let mut dictionary = DataDictionary::default();
        for record in csv.records() {
            let record = record?;
            let field = |i: usize| record.get(columns[i]).unwrap_or("").to_string();

            let variable = field(0);
            if variable.is_empty() {
                continue;
            }
            let encrypted_raw = field(3);
            let encrypted = if encrypted_raw.is_empty() {
                false
            } else {
                parse_flag(&encrypted_raw).ok_or_else(|| {
                    Error::Schema(format!(
                        "variable '{}' has invalid encrypted value '{}'",
                        variable, encrypted_raw
                    ))
                })?
            };

            dictionary.insert(DictionaryEntry {
                expected_file_extensions: parse_extensions(&field(2)),
                data_type: field(1),
                encrypted,
                provenance: field(4),
                variable,
            })?;
        }

        Ok(dictionary)
    }

    fn insert(&mut self, entry: DictionaryEntry) -> Result<()> {
        if self.index.contains_key(&entry.variable) {
            return Err(Error::Schema(format!(
                "variable '{}' appears more than once",
                entry.variable
            )));
        }

        let provenance = parse_provenance(&entry.provenance);
        if let Some(members) = provenance.get("variables") {
            self.combinations.push(CombinationRow {
                name: entry.variable.clone(),
                members: split_list(members),
            });
        }
        if let (Some(visit), Some(tasks)) = (provenance.get("visit"), provenance.get("tasks")) {
            self.visits.insert(visit.clone(), split_list(tasks));
        }

        self.index.insert(entry.variable.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn entry(&self, variable: &str) -> Option<&DictionaryEntry> {
        self.index.get(variable).map(|&i| &self.entries[i])
    }

    /// Rows in declared order
    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    pub fn combinations(&self) -> &[CombinationRow] {
        &self.combinations
    }

    /// Combination row a variable belongs to, if any
    pub fn combination_for(&self, variable: &str) -> Option<&CombinationRow> {
        self.combinations
            .iter()
            .find(|row| row.members.iter().any(|m| m == variable))
    }

    pub fn is_combination_row(&self, variable: &str) -> bool {
        self.combinations.iter().any(|row| row.name == variable)
    }

    /// Tasks linked to a visit by a status-tracking row
    pub fn visit_tasks(&self, visit: &str) -> Option<&[String]> {
        self.visits.get(visit).map(Vec::as_slice)
    }

    /// `identifier + ext` for every expected extension, in declared order
    pub fn expected_files(&self, identifier: &crate::models::Identifier) -> Vec<String> {
        self.entry(identifier.variable())
            .map(|entry| {
                entry
                    .expected_file_extensions
                    .iter()
                    .map(|ext| format!("{}{}", identifier, ext))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Compare with the accepted snapshot and refresh it when allowed
    ///
    /// A changed dictionary is fatal unless `accept_changes` is set.
    pub fn check_drift(&self, current: &Path, snapshot: &Path, accept_changes: bool) -> Result<DriftStatus> {
        if !snapshot.is_file() {
            copy_snapshot(current, snapshot)?;
            info!("Data dictionary snapshot created: {}", snapshot.display());
            return Ok(DriftStatus::SnapshotCreated);
        }

        let latest = DataDictionary::load(snapshot)?;
        if latest == *self {
            return Ok(DriftStatus::Unchanged);
        }

        let summary = describe_drift(&latest, self);
        if accept_changes {
            warn!("Data dictionary changed ({}), refreshing snapshot", summary);
            copy_snapshot(current, snapshot)?;
            return Ok(DriftStatus::Accepted);
        }

        Err(Error::DictionaryDrift(format!(
            "{} differs from {} ({}); rerun with --accept-dictionary if the change is intended",
            current.display(),
            snapshot.display(),
            summary
        )))
    }
}

fn copy_snapshot(current: &Path, snapshot: &Path) -> Result<()> {
    let bytes = std::fs::read(current)?;
    write_atomic(snapshot, |file| {
        use std::io::Write;
        file.write_all(&bytes)?;
        Ok(())
    })
}

fn describe_drift(old: &DataDictionary, new: &DataDictionary) -> String {
    let mut parts = Vec::new();
    for entry in new.entries() {
        match old.entry(&entry.variable) {
            None => parts.push(format!("added {}", entry.variable)),
            Some(previous) if previous != entry => parts.push(format!("changed {}", entry.variable)),
            Some(_) => {}
        }
    }
    for entry in old.entries() {
        if new.entry(&entry.variable).is_none() {
            parts.push(format!("removed {}", entry.variable));
        }
    }
    if parts.is_empty() {
        "row order changed".to_string()
    } else {
        parts.join(", ")
    }
}

/// `".csv", ".log"` / `[.csv,.log]` / `.csv` → `[".csv", ".log"]`
fn parse_extensions(raw: &str) -> Vec<String> {
    let mut extensions: Vec<String> = Vec::new();
    for ext in split_list(raw.trim().trim_start_matches('[').trim_end_matches(']')) {
        if !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }
    extensions
}

/// Comma-separated list with quotes and whitespace stripped
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// `key: value; key: value` with lowercase keys
fn parse_provenance(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|part| part.split_once(':'))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect()
}
