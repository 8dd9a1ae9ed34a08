//! Ledger row types
//!
//! Column order of every struct is the on-disk column order. Booleans are
//! written as `1`/`0` and read leniently so reviewers can type `TRUE`/`yes`.

use crate::models::{DictionaryEntry, Identifier};
use rdqa_common::RunContext;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Parse `1/0/true/false/yes/no` (any case)
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "1.0" => Some(true),
        "0" | "false" | "no" | "n" | "0.0" | "" => Some(false),
        _ => None,
    }
}

/// serde adapter for `1`/`0` boolean columns
pub mod flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "1" } else { "0" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_flag(&raw).ok_or_else(|| de::Error::custom(format!("invalid flag '{}'", raw)))
    }
}

/// A CSV ledger row with a fixed schema
pub trait LedgerRow: Serialize + DeserializeOwned + Clone {
    /// Ledger name used in messages
    const NAME: &'static str;
    /// Required columns, in on-disk order
    const COLUMNS: &'static [&'static str];

    /// (datetime, identifier) sort key
    fn sort_key(&self) -> (&str, &str);

    fn identifier(&self) -> &str {
        self.sort_key().1
    }
}

/// `file_record.csv`: identifiers handed from intake to QA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecordRow {
    pub datetime: String,
    pub user: String,
    pub data_type: String,
    pub identifier: String,
    #[serde(with = "flag")]
    pub encrypted: bool,
    pub subject: String,
    pub suffix: String,
}

impl LedgerRow for FileRecordRow {
    const NAME: &'static str = "file record";
    const COLUMNS: &'static [&'static str] = &[
        "datetime", "user", "dataType", "identifier", "encrypted", "subject", "suffix",
    ];

    fn sort_key(&self) -> (&str, &str) {
        (&self.datetime, &self.identifier)
    }
}

/// `validated-file-record.csv`: identifiers promoted to the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedFileRow {
    pub datetime: String,
    pub user: String,
    pub data_type: String,
    pub identifier: String,
    pub deviation_string: String,
    #[serde(with = "flag")]
    pub encrypted: bool,
    pub subject: String,
    pub suffix: String,
}

impl LedgerRow for ValidatedFileRow {
    const NAME: &'static str = "validated file record";
    const COLUMNS: &'static [&'static str] = &[
        "datetime", "user", "dataType", "identifier", "deviationString", "encrypted", "subject", "suffix",
    ];

    fn sort_key(&self) -> (&str, &str) {
        (&self.datetime, &self.identifier)
    }
}

/// `pending-files-<ts>.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFileRow {
    pub datetime: String,
    pub user: String,
    #[serde(with = "flag")]
    pub pass_raw: bool,
    pub identifier: String,
    pub subject: String,
    pub data_type: String,
    #[serde(with = "flag")]
    pub encrypted: bool,
    pub suffix: String,
    pub deviation_string: String,
}

impl LedgerRow for PendingFileRow {
    const NAME: &'static str = "pending files";
    const COLUMNS: &'static [&'static str] = &[
        "datetime", "user", "passRaw", "identifier", "subject", "dataType", "encrypted", "suffix", "deviationString",
    ];

    fn sort_key(&self) -> (&str, &str) {
        (&self.datetime, &self.identifier)
    }
}

impl PendingFileRow {
    pub fn new(
        run: &RunContext,
        identifier: &Identifier,
        entry: &DictionaryEntry,
        pass_raw: bool,
        deviation_string: String,
    ) -> Self {
        Self {
            datetime: run.timestamp().to_string(),
            user: run.user().to_string(),
            pass_raw,
            identifier: identifier.to_string(),
            subject: identifier.subject().to_string(),
            data_type: entry.data_type.clone(),
            encrypted: entry.encrypted,
            suffix: identifier.suffix(),
            deviation_string,
        }
    }
}

/// `pending-errors-<ts>.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingErrorRow {
    pub datetime: String,
    pub user: String,
    pub identifier: String,
    pub error_type: String,
    pub error_details: String,
    pub path: String,
}

impl LedgerRow for PendingErrorRow {
    const NAME: &'static str = "pending errors";
    const COLUMNS: &'static [&'static str] = &[
        "datetime", "user", "identifier", "errorType", "errorDetails", "path",
    ];

    fn sort_key(&self) -> (&str, &str) {
        (&self.datetime, &self.identifier)
    }
}

/// `qa-checklist.csv` row, keyed by (identifier, deviationString)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaChecklistEntry {
    pub identifier: String,
    pub deviation_string: String,
    #[serde(with = "flag")]
    pub qa: bool,
    #[serde(with = "flag")]
    pub local_move: bool,
    pub datetime: String,
    pub user: String,
    pub subject: String,
    pub data_type: String,
    #[serde(with = "flag")]
    pub encrypted: bool,
    pub suffix: String,
}

impl LedgerRow for QaChecklistEntry {
    const NAME: &'static str = "QA checklist";
    const COLUMNS: &'static [&'static str] = &[
        "identifier", "deviationString", "qa", "localMove", "datetime", "user", "subject", "dataType", "encrypted", "suffix",
    ];

    fn sort_key(&self) -> (&str, &str) {
        (&self.datetime, &self.identifier)
    }
}

impl QaChecklistEntry {
    /// Fresh row for a surfaced identifier, both flags cleared
    pub fn surfaced(pending: &PendingFileRow, run: &RunContext) -> Self {
        Self {
            identifier: pending.identifier.clone(),
            deviation_string: pending.deviation_string.clone(),
            qa: false,
            local_move: false,
            datetime: run.timestamp().to_string(),
            user: run.user().to_string(),
            subject: pending.subject.clone(),
            data_type: pending.data_type.clone(),
            encrypted: pending.encrypted,
            suffix: pending.suffix.clone(),
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.identifier, &self.deviation_string)
    }

    /// Both reviewer flags set
    pub fn is_approved(&self) -> bool {
        self.qa && self.local_move
    }
}

impl ValidatedFileRow {
    pub fn promoted(entry: &QaChecklistEntry, run: &RunContext) -> Self {
        Self {
            datetime: run.timestamp().to_string(),
            user: run.user().to_string(),
            data_type: entry.data_type.clone(),
            identifier: entry.identifier.clone(),
            deviation_string: entry.deviation_string.clone(),
            encrypted: entry.encrypted,
            subject: entry.subject.clone(),
            suffix: entry.suffix.clone(),
        }
    }
}

impl FileRecordRow {
    pub fn staged(pending: &PendingFileRow, run: &RunContext) -> Self {
        Self {
            datetime: run.timestamp().to_string(),
            user: run.user().to_string(),
            data_type: pending.data_type.clone(),
            identifier: pending.identifier.clone(),
            encrypted: pending.encrypted,
            subject: pending.subject.clone(),
            suffix: pending.suffix.clone(),
        }
    }
}
