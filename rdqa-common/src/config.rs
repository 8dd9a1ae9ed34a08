//! Dataset configuration loading and resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `RDQA_CONFIG` environment variable
//! 3. `<dataset>/data-monitoring/rdqa.toml`
//! 4. `<user config dir>/rdqa/config.toml`
//! 5. Built-in defaults (fallback, with a warning)
//!
//! The dataset root follows the same order: CLI, `RDQA_DATASET_ROOT`, then the
//! `dataset_root` key of whichever config file was found.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "RDQA_CONFIG";

/// Environment variable naming the dataset root
pub const DATASET_ROOT_ENV_VAR: &str = "RDQA_DATASET_ROOT";

/// Config filename looked up inside the dataset's monitoring directory
pub const DATASET_CONFIG_FILENAME: &str = "rdqa.toml";

/// Content validator applied to a dataType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentCheck {
    /// Tabular data file + free-text log + binary sidecar
    TabularTriplet,
    /// Header + marker + data recording set
    RecordingHeader,
}

/// Dataset configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset root (optional, CLI and environment take priority)
    pub dataset_root: Option<PathBuf>,

    /// Data dictionary CSV, relative to the dataset root
    pub data_dictionary: PathBuf,

    /// Directory layout of the dataset
    pub layout: LayoutConfig,

    /// Identifier naming grammar
    pub naming: NamingConfig,

    /// dataTypes whose variables are expected at every observed visit
    pub visit_data_types: Vec<String>,

    /// dataType → content validator
    pub content_checks: BTreeMap<String, ContentCheck>,

    /// Drop validation errors for files last modified before this date
    pub ignore_before: Option<NaiveDate>,

    /// Classify subjects on a worker pool
    pub parallel: bool,

    /// Delete archive files of identifiers failing checked validation
    pub purge_failed_checked: bool,

    /// Override for the user name recorded in ledgers
    pub user: Option<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Relative locations of the dataset areas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Intake area (`<session>_<run>/<dataType>/sub-<subject>/`)
    pub raw: PathBuf,
    /// QA holding area, intake layout, holds `qa-checklist.csv`
    pub pending_qa: PathBuf,
    /// Archive (`sub-<subject>/<session>_<run>/<dataType>/`)
    pub checked: PathBuf,
    /// Monitoring directory holding the ledgers
    pub monitoring: PathBuf,
    /// Directory receiving pending-files / pending-errors snapshots
    pub pending: PathBuf,
}

/// Naming grammar patterns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Regex the subject token (without `sub-`) must match
    pub subject_pattern: String,
    /// Allowed `session_run_event` suffix combinations
    pub allowed_suffixes: Vec<String>,
    /// Regex for the session token
    pub session_pattern: String,
    /// Regex for the run token
    pub run_pattern: String,
    /// Regex for the event token
    pub event_pattern: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        let mut content_checks = BTreeMap::new();
        content_checks.insert("psychopy".to_string(), ContentCheck::TabularTriplet);
        content_checks.insert("eeg".to_string(), ContentCheck::RecordingHeader);

        Self {
            dataset_root: None,
            data_dictionary: PathBuf::from("data-monitoring/data-dictionary/central-tracker_datadict.csv"),
            layout: LayoutConfig::default(),
            naming: NamingConfig::default(),
            visit_data_types: vec![
                "psychopy".to_string(),
                "eeg".to_string(),
                "audio".to_string(),
                "video".to_string(),
                "digi".to_string(),
            ],
            content_checks,
            ignore_before: None,
            parallel: false,
            purge_failed_checked: true,
            user: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            raw: PathBuf::from("sourcedata/raw"),
            pending_qa: PathBuf::from("sourcedata/pending-qa"),
            checked: PathBuf::from("sourcedata/checked"),
            monitoring: PathBuf::from("data-monitoring"),
            pending: PathBuf::from("data-monitoring/pending"),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            subject_pattern: r"^\d+$".to_string(),
            allowed_suffixes: vec!["s1_r1_e1".to_string()],
            session_pattern: r"^s\d+$".to_string(),
            run_pattern: r"^r\d+$".to_string(),
            event_pattern: r"^e\d+$".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Absolute paths of every area and ledger for one dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub root: PathBuf,
    pub raw: PathBuf,
    pub pending_qa: PathBuf,
    pub checked: PathBuf,
    pub monitoring: PathBuf,
    pub pending: PathBuf,
    pub data_dictionary: PathBuf,
    pub dictionary_snapshot: PathBuf,
    pub file_record: PathBuf,
    pub validated_file_record: PathBuf,
    pub qa_checklist: PathBuf,
}

impl DatasetConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: DatasetConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration and dataset root from CLI, environment and files
    pub fn resolve(
        cli_config: Option<&Path>,
        cli_dataset_root: Option<&Path>,
    ) -> Result<(Self, PathBuf)> {
        let env_root = std::env::var(DATASET_ROOT_ENV_VAR).ok().map(PathBuf::from);
        let early_root = cli_dataset_root.map(Path::to_path_buf).or(env_root);

        let config = match resolve_config_path(cli_config, early_root.as_deref())? {
            Some(path) => {
                info!("Loading dataset config: {}", path.display());
                Self::load(&path)?
            }
            None => {
                warn!("No dataset config file found, using built-in defaults");
                Self::default()
            }
        };

        let root = early_root
            .or_else(|| config.dataset_root.clone())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Dataset root not configured. Use one of:\n\
                     1. Command line: --dataset <path>\n\
                     2. Environment: {}=<path>\n\
                     3. Config file: dataset_root = \"<path>\"",
                    DATASET_ROOT_ENV_VAR
                ))
            })?;

        if !root.is_dir() {
            return Err(Error::Config(format!(
                "Dataset root is not a directory: {}",
                root.display()
            )));
        }

        Ok((config, root))
    }

    /// Structural checks that do not need the regex engine
    pub fn validate(&self) -> Result<()> {
        if self.naming.allowed_suffixes.is_empty() {
            return Err(Error::Config("naming.allowed_suffixes must not be empty".to_string()));
        }
        for suffix in &self.naming.allowed_suffixes {
            if suffix.split('_').count() != 3 {
                return Err(Error::Config(format!(
                    "naming.allowed_suffixes entry '{}' is not <session>_<run>_<event>",
                    suffix
                )));
            }
        }
        if self.data_dictionary.as_os_str().is_empty() {
            return Err(Error::Config("data_dictionary must not be empty".to_string()));
        }
        Ok(())
    }

    /// Absolute paths for a dataset rooted at `root`
    pub fn paths(&self, root: &Path) -> DatasetPaths {
        let monitoring = root.join(&self.layout.monitoring);
        let pending_qa = root.join(&self.layout.pending_qa);
        DatasetPaths {
            root: root.to_path_buf(),
            raw: root.join(&self.layout.raw),
            checked: root.join(&self.layout.checked),
            pending: root.join(&self.layout.pending),
            data_dictionary: root.join(&self.data_dictionary),
            dictionary_snapshot: monitoring.join("data-dictionary").join("datadict-latest.csv"),
            file_record: monitoring.join("file_record.csv"),
            validated_file_record: monitoring.join("validated-file-record.csv"),
            qa_checklist: pending_qa.join("qa-checklist.csv"),
            monitoring,
            pending_qa,
        }
    }
}

/// Find the config file to load, if any
fn resolve_config_path(cli_arg: Option<&Path>, dataset_root: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return existing(path.to_path_buf()).map(Some);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return existing(PathBuf::from(path)).map(Some);
    }

    // Priority 3: Config inside the dataset
    if let Some(root) = dataset_root {
        let candidate = root
            .join(LayoutConfig::default().monitoring)
            .join(DATASET_CONFIG_FILENAME);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }

    // Priority 4: User config directory
    if let Some(candidate) = dirs::config_dir().map(|d| d.join("rdqa").join("config.toml")) {
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Explicitly named config files must exist
fn existing(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DatasetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.level, "info");
        assert!(config.purge_failed_checked);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: DatasetConfig = toml::from_str(
            r#"
            visit_data_types = ["psychopy"]
            ignore_before = "2024-02-01"

            [naming]
            allowed_suffixes = ["s1_r1_e1", "s2_r1_e1"]

            [content_checks]
            psychopy = "tabular-triplet"
            "#,
        )
        .unwrap();

        assert_eq!(config.visit_data_types, vec!["psychopy"]);
        assert_eq!(config.naming.allowed_suffixes.len(), 2);
        assert_eq!(config.naming.subject_pattern, r"^\d+$");
        assert_eq!(config.ignore_before, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(config.content_checks.len(), 1);
        assert_eq!(config.layout.raw, PathBuf::from("sourcedata/raw"));
    }

    #[test]
    fn test_malformed_suffix_rejected() {
        let mut config = DatasetConfig::default();
        config.naming.allowed_suffixes = vec!["s1_r1".to_string()];
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_paths_are_rooted() {
        let config = DatasetConfig::default();
        let paths = config.paths(Path::new("/data/study"));
        assert_eq!(paths.raw, PathBuf::from("/data/study/sourcedata/raw"));
        assert_eq!(
            paths.qa_checklist,
            PathBuf::from("/data/study/sourcedata/pending-qa/qa-checklist.csv")
        );
        assert_eq!(
            paths.dictionary_snapshot,
            PathBuf::from("/data/study/data-monitoring/data-dictionary/datadict-latest.csv")
        );
    }
}
