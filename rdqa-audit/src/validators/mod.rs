//! Content validators
//!
//! Per-dataType checks run on the files of one identifier after the tree
//! diff has accepted their names and placement.
//!
//! # Validators
//! 1. **tabular_triplet** - data table + free-text log + binary sidecar
//! 2. **recording_header** - header + marker + data recording triple
//!
//! Findings come back as [`ValidationError`]s. `Err` is reserved for inputs
//! the validator cannot interpret at all, such as a filename that does not
//! yield an identifier.

pub mod recording_header;
pub mod tabular_triplet;

pub use recording_header::RecordingHeaderValidator;
pub use tabular_triplet::TabularTripletValidator;

use crate::models::{split_extension, Identifier, NamingError, NamingGrammar};
use crate::types::ValidationError;
use rdqa_common::config::ContentCheck;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Validator contract failures
#[derive(Debug, Error)]
pub enum ContentCheckError {
    #[error("Cannot derive an identifier from {path}: {source}")]
    MalformedFilename {
        path: PathBuf,
        #[source]
        source: NamingError,
    },

    #[error("Files of more than one identifier passed together: {0} and {1}")]
    MixedIdentifiers(String, String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ContentCheckError> for rdqa_common::Error {
    fn from(err: ContentCheckError) -> Self {
        match err {
            ContentCheckError::Read { source, .. } => rdqa_common::Error::Io(source),
            other => rdqa_common::Error::InvalidInput(other.to_string()),
        }
    }
}

/// Content check over one identifier's files
pub trait ContentValidator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validate the files of a single identifier
    fn validate(&self, files: &[PathBuf]) -> Result<Vec<ValidationError>, ContentCheckError>;
}

/// Validator configured for a dataType
pub fn validator_for(check: ContentCheck, grammar: &NamingGrammar) -> Box<dyn ContentValidator> {
    match check {
        ContentCheck::TabularTriplet => Box::new(TabularTripletValidator::new(grammar.clone())),
        ContentCheck::RecordingHeader => Box::new(RecordingHeaderValidator::new(grammar.clone())),
    }
}

/// Identifier shared by every file, with each file's extension
fn identify<'a>(
    grammar: &NamingGrammar,
    files: &'a [PathBuf],
) -> Result<Option<(Identifier, Vec<(String, &'a Path)>)>, ContentCheckError> {
    let mut identifier: Option<Identifier> = None;
    let mut by_extension = Vec::with_capacity(files.len());

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (stem, extension) = split_extension(&name);
        let id = grammar
            .parse(stem)
            .map_err(|source| ContentCheckError::MalformedFilename {
                path: path.clone(),
                source,
            })?;

        match &identifier {
            Some(existing) if *existing != id => {
                return Err(ContentCheckError::MixedIdentifiers(existing.to_string(), id.to_string()));
            }
            Some(_) => {}
            None => identifier = Some(id),
        }
        by_extension.push((extension.to_ascii_lowercase(), path.as_path()));
    }

    Ok(identifier.map(|id| (id, by_extension)))
}

fn find<'a>(files: &[(String, &'a Path)], extension: &str) -> Option<&'a Path> {
    files.iter().find(|(ext, _)| ext == extension).map(|(_, p)| *p)
}

fn read_text(path: &Path) -> Result<String, ContentCheckError> {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|source| ContentCheckError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
