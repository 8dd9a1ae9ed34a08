//! Validation findings
//!
//! Findings are accumulated, never raised. Only structural faults
//! ([`rdqa_common::Error`]) abort a run.

use crate::models::Identifier;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Category of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorKind {
    NamingError,
    MisplacedFile,
    MissingFile,
    UnexpectedFile,
    ExceptionFileError,
    CombinationError,
    ContentError,
    IssueFileFound,
}

impl ErrorKind {
    /// Value written to the `errorType` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NamingError => "NamingError",
            ErrorKind::MisplacedFile => "MisplacedFile",
            ErrorKind::MissingFile => "MissingFile",
            ErrorKind::UnexpectedFile => "UnexpectedFile",
            ErrorKind::ExceptionFileError => "ExceptionFileError",
            ErrorKind::CombinationError => "CombinationError",
            ErrorKind::ContentError => "ContentError",
            ErrorKind::IssueFileFound => "IssueFileFound",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One naming/placement/content violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub message: String,
    pub identifier: Option<Identifier>,
    pub path: Option<PathBuf>,
}

impl ValidationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            identifier: None,
            path: None,
        }
    }

    pub fn with_identifier(mut self, identifier: &Identifier) -> Self {
        self.identifier = Some(identifier.clone());
        self
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// All findings of one pass
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ValidationError>) {
        self.errors.extend(errors);
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of findings of one kind
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }

    /// Findings attributed to `identifier`
    pub fn for_identifier<'a>(
        &'a self,
        identifier: &'a Identifier,
    ) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.errors
            .iter()
            .filter(move |e| e.identifier.as_ref() == Some(identifier))
    }

    /// Identifiers with at least one finding
    pub fn failed_identifiers(&self) -> BTreeSet<Identifier> {
        self.errors
            .iter()
            .filter_map(|e| e.identifier.clone())
            .collect()
    }

    /// Keep only findings matching `keep`
    pub fn retain(&mut self, keep: impl FnMut(&ValidationError) -> bool) {
        self.errors.retain(keep);
    }

    /// Stable order (identifier, kind, path, message) with exact duplicates removed
    pub fn normalize(&mut self) {
        self.errors.sort_by(|a, b| {
            a.identifier
                .cmp(&b.identifier)
                .then(a.kind.cmp(&b.kind))
                .then(a.path.cmp(&b.path))
                .then(a.message.cmp(&b.message))
        });
        self.errors.dedup();
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

/// Mutex-guarded sink shared by worker threads
#[derive(Debug, Default)]
pub struct ErrorCollector {
    inner: Mutex<Vec<ValidationError>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&self, errors: Vec<ValidationError>) {
        if errors.is_empty() {
            return;
        }
        match self.inner.lock() {
            Ok(mut guard) => guard.extend(errors),
            Err(poisoned) => poisoned.into_inner().extend(errors),
        }
    }

    pub fn into_report(self) -> ValidationReport {
        let errors = match self.inner.into_inner() {
            Ok(errors) => errors,
            Err(poisoned) => poisoned.into_inner(),
        };
        ValidationReport { errors }
    }
}
