//! Tabular triplet validator
//!
//! Behavioral task output: a `.csv` data table, a `.log` free-text log and a
//! `.psydat` binary sidecar.
//!
//! # Checks
//! 1. The data table has rows
//! 2. It has an `id` or `participant` column (exact, case-sensitive)
//! 3. Every row's id equals the subject number
//!
//! The log is only used to match the files it mentions to the triplet's
//! companions. Logs usually name the output before it was renamed to its
//! identifier, so an unmatched reference is not a finding. Neither is a
//! missing log or sidecar.

use super::{file_name, find, identify, read_text, ContentCheckError, ContentValidator};
use crate::models::{Identifier, NamingGrammar};
use crate::types::{ErrorKind, ValidationError};
use std::path::{Path, PathBuf};
use tracing::debug;

const ID_COLUMNS: [&str; 2] = ["id", "participant"];

pub struct TabularTripletValidator {
    grammar: NamingGrammar,
}

impl TabularTripletValidator {
    pub fn new(grammar: NamingGrammar) -> Self {
        Self { grammar }
    }

    fn check_table(&self, id: &Identifier, path: &Path) -> Result<Vec<ValidationError>, ContentCheckError> {
        let content = read_text(path)?;
        let error = |message: String| {
            ValidationError::new(ErrorKind::ContentError, message)
                .with_identifier(id)
                .with_path(path)
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(e) => return Ok(vec![error(format!("Cannot parse {}: {}", file_name(path), e))]),
        };

        let mut rows = Vec::new();
        for record in reader.records() {
            match record {
                Ok(record) => rows.push(record),
                Err(e) => return Ok(vec![error(format!("Cannot parse {}: {}", file_name(path), e))]),
            }
        }

        if rows.is_empty() {
            return Ok(vec![error(format!("No data found in {}", file_name(path)))]);
        }

        let Some(column) = ID_COLUMNS
            .iter()
            .find_map(|name| headers.iter().position(|h| h == *name))
        else {
            return Ok(vec![error(format!(
                "{} is missing an id column (expected 'id' or 'participant')",
                file_name(path)
            ))]);
        };

        let mut mismatched: Vec<String> = Vec::new();
        for row in &rows {
            let value = row.get(column).unwrap_or("").trim();
            if !same_subject(value, id.subject()) && !mismatched.iter().any(|m| m == value) {
                mismatched.push(value.to_string());
            }
        }

        if mismatched.is_empty() {
            return Ok(Vec::new());
        }
        let shown: Vec<String> = mismatched.iter().map(|v| format!("'{}'", v)).collect();
        Ok(vec![error(format!(
            "Participant id in {} does not match subject {}: found [{}]",
            file_name(path),
            id.subject(),
            shown.join(", ")
        ))])
    }
}

/// Companion files named by the log, matched by basename (any case)
fn log_companions<'a>(content: &str, files: &[(String, &'a Path)]) -> Vec<&'a Path> {
    let mut matched: Vec<&Path> = Vec::new();
    for reference in log_references(content) {
        let referenced = reference
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(reference);
        let companion = files
            .iter()
            .map(|(_, path)| *path)
            .find(|path| file_name(path).eq_ignore_ascii_case(referenced));
        match companion {
            Some(path) if !matched.contains(&path) => matched.push(path),
            Some(_) => {}
            None => debug!(reference = referenced, "Log reference does not name a companion"),
        }
    }
    matched
}

/// Tokens naming a subject's `.csv` or `.psydat`, quotes and whitespace stripped
fn log_references(content: &str) -> impl Iterator<Item = &str> {
    content
        .split(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | ';' | '=' | '(' | ')'))
        .filter(|token| token.contains("sub-"))
        .filter(|token| {
            let lower = token.to_ascii_lowercase();
            lower.ends_with(".csv") || lower.ends_with(".psydat")
        })
}

/// Numeric comparison when both sides are numbers, exact otherwise
fn same_subject(value: &str, subject: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    if let (Ok(a), Ok(b)) = (value.parse::<i64>(), subject.parse::<i64>()) {
        return a == b;
    }
    if let (Ok(a), Ok(b)) = (value.parse::<f64>(), subject.parse::<f64>()) {
        return a == b;
    }
    value == subject
}

impl ContentValidator for TabularTripletValidator {
    fn name(&self) -> &'static str {
        "tabular-triplet"
    }

    fn validate(&self, files: &[PathBuf]) -> Result<Vec<ValidationError>, ContentCheckError> {
        let Some((id, files)) = identify(&self.grammar, files)? else {
            return Ok(Vec::new());
        };

        let mut errors = Vec::new();
        match find(&files, ".csv") {
            Some(table) => errors.extend(self.check_table(&id, table)?),
            None => debug!(identifier = %id, "No data table, skipping id checks"),
        }
        if let Some(log) = find(&files, ".log") {
            let companions = log_companions(&read_text(log)?, &files);
            debug!(identifier = %id, matched = companions.len(), "Log references matched");
        }
        Ok(errors)
    }
}
