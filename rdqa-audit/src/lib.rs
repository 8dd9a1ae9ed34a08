//! rdqa-audit library interface
//!
//! Validation and QA workflow engine for a research dataset laid out as
//! raw intake → QA holding area → checked archive.
//!
//! Exposes public APIs for the binary and for integration testing.

pub mod models;
pub mod services;
pub mod types;
pub mod validators;

pub use crate::types::{ErrorKind, ValidationError, ValidationReport};

use crate::models::{DataDictionary, DriftStatus, NamingGrammar};
use rdqa_common::config::DatasetPaths;
use rdqa_common::{DatasetConfig, Result};
use std::path::Path;
use tracing::info;

/// Everything a pass needs about one dataset, loaded once per run
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub config: DatasetConfig,
    pub paths: DatasetPaths,
    pub dictionary: DataDictionary,
    pub grammar: NamingGrammar,
}

impl AuditContext {
    /// Load the dictionary, guard against drift, compile the naming grammar
    ///
    /// Fails before anything is written when the dictionary is missing or
    /// has changed since the last accepted snapshot.
    pub fn load(config: DatasetConfig, root: &Path, accept_dictionary_changes: bool) -> Result<Self> {
        config.validate()?;
        let paths = config.paths(root);

        let dictionary = DataDictionary::load(&paths.data_dictionary)?;
        let status = dictionary.check_drift(
            &paths.data_dictionary,
            &paths.dictionary_snapshot,
            accept_dictionary_changes,
        )?;
        if status != DriftStatus::Unchanged {
            info!(status = ?status, "Data dictionary snapshot updated");
        }

        Self::from_parts(config, root, dictionary)
    }

    /// Build from an already loaded dictionary (no drift check)
    pub fn from_parts(config: DatasetConfig, root: &Path, dictionary: DataDictionary) -> Result<Self> {
        let grammar = NamingGrammar::from_config(&config.naming)?;
        let paths = config.paths(root);
        info!(
            root = %root.display(),
            variables = dictionary.entries().len(),
            combinations = dictionary.combinations().len(),
            "Dataset loaded"
        );
        Ok(Self {
            config,
            paths,
            dictionary,
            grammar,
        })
    }
}
