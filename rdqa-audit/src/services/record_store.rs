//! Persistent CSV ledgers
//!
//! Every write goes to a temporary file in the destination directory and is
//! renamed over the target, so an aborted run never leaves a half-written
//! ledger. Ledgers are rewritten in full, sorted by (datetime, identifier).

use crate::models::LedgerRow;
use rdqa_common::time::parse_timestamp;
use rdqa_common::{Error, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Write `path` atomically (temp file + rename)
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Untyped CSV content, as handed over by external collaborators
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<S: Into<String>>(&mut self, row: impl IntoIterator<Item = S>) {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Read a CSV file into a table
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Reorder to `columns`; a missing or extra column is a schema error
    pub fn project(&self, name: &str, columns: &[&str]) -> Result<Table> {
        check_columns(name, self.headers.iter().map(String::as_str), columns)?;

        let positions: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.headers.iter().position(|h| h == c))
            .collect();

        let mut projected = Table::new(columns.iter().copied());
        for (n, row) in self.rows.iter().enumerate() {
            if row.len() != self.headers.len() {
                return Err(Error::Schema(format!(
                    "{} row {} has {} fields, expected {}",
                    name,
                    n + 1,
                    row.len(),
                    self.headers.len()
                )));
            }
            projected.push_row(positions.iter().map(|&i| row[i].clone()));
        }
        Ok(projected)
    }

    /// Deserialize every row by header name
    pub fn deserialize<R: DeserializeOwned>(&self) -> Result<Vec<R>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Internal(format!("CSV buffer flush failed: {}", e)))?;

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let mut out = Vec::with_capacity(self.rows.len());
        for row in reader.deserialize() {
            out.push(row.map_err(|e| Error::Schema(e.to_string()))?);
        }
        Ok(out)
    }
}

fn check_columns<'a>(
    name: &str,
    found: impl Iterator<Item = &'a str>,
    required: &[&str],
) -> Result<()> {
    let found: Vec<&str> = found.collect();
    let found_set: BTreeSet<&str> = found.iter().copied().collect();
    let required_set: BTreeSet<&str> = required.iter().copied().collect();

    if found.len() != found_set.len() || found_set != required_set {
        let missing: Vec<&str> = required_set.difference(&found_set).copied().collect();
        let extra: Vec<&str> = found_set.difference(&required_set).copied().collect();
        return Err(Error::Schema(format!(
            "{} columns do not match the required schema (missing: [{}], unexpected: [{}])",
            name,
            missing.join(", "),
            extra.join(", ")
        )));
    }
    Ok(())
}

/// One CSV ledger file with a fixed row type
#[derive(Debug, Clone)]
pub struct Ledger<R> {
    path: PathBuf,
    _row: PhantomData<R>,
}

impl<R: LedgerRow> Ledger<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _row: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn reader(&self) -> Result<Option<csv::Reader<File>>> {
        if !self.exists() || fs::metadata(&self.path)?.len() == 0 {
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        check_columns(R::NAME, reader.headers()?.iter(), R::COLUMNS)?;
        Ok(Some(reader))
    }

    /// All rows; any malformed row is fatal
    pub fn load(&self) -> Result<Vec<R>> {
        let Some(mut reader) = self.reader()? else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row.map_err(|e| {
                Error::Schema(format!("{} {}: {}", R::NAME, self.path.display(), e))
            })?);
        }
        Ok(rows)
    }

    /// Rows that parse; malformed rows are dropped and counted
    pub fn load_lenient(&self) -> Result<(Vec<R>, usize)> {
        let Some(mut reader) = self.reader()? else {
            return Ok((Vec::new(), 0));
        };
        let mut rows = Vec::new();
        let mut dropped = 0;
        for row in reader.deserialize::<R>() {
            match row {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("Dropping malformed {} row in {}: {}", R::NAME, self.path.display(), e);
                    dropped += 1;
                }
            }
        }
        Ok((rows, dropped))
    }

    /// Create the file with only its header; returns true when created
    pub fn ensure_exists(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }
        self.rewrite(Vec::new())?;
        debug!("Created empty {} at {}", R::NAME, self.path.display());
        Ok(true)
    }

    /// Replace the file with `rows`, sorted by (datetime, identifier)
    pub fn rewrite(&self, mut rows: Vec<R>) -> Result<()> {
        rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        write_atomic(&self.path, |file| {
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
            writer.write_record(R::COLUMNS)?;
            for row in &rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    /// Add rows and rewrite the whole ledger sorted
    pub fn append(&self, rows: Vec<R>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut all = self.load()?;
        all.extend(rows);
        self.rewrite(all)
    }

    /// Schema-checked append of untyped rows; nothing is written on mismatch
    pub fn append_table(&self, table: &Table) -> Result<()> {
        let rows = table.project(R::NAME, R::COLUMNS)?.deserialize::<R>()?;
        self.append(rows)
    }
}

/// Every `<prefix>-<timestamp>.csv` in `dir` as (timestamp, path), oldest first
pub fn snapshots(dir: &Path, prefix: &str) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let head = format!("{}-", prefix);
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(stamp) = name
            .strip_prefix(&head)
            .and_then(|rest| rest.strip_suffix(".csv"))
        else {
            continue;
        };
        if parse_timestamp(stamp).is_none() {
            continue;
        }
        found.push((stamp.to_string(), entry.path()));
    }
    found.sort();
    Ok(found)
}

/// Newest `<prefix>-<timestamp>.csv` in `dir`
pub fn latest_snapshot(dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    Ok(snapshots(dir, prefix)?.pop().map(|(_, path)| path))
}
