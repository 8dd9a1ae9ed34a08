//! Configuration resolution tests
//!
//! Tests touching RDQA_CONFIG or RDQA_DATASET_ROOT are marked #[serial] so
//! they do not race on the process environment.

use rdqa_common::config::{ContentCheck, CONFIG_ENV_VAR, DATASET_CONFIG_FILENAME, DATASET_ROOT_ENV_VAR};
use rdqa_common::{DatasetConfig, Error};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(DATASET_ROOT_ENV_VAR);
}

fn write_config(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_config_and_root_take_priority() {
    clear_env();
    let dataset = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let cli = write_config(other.path(), "cli.toml", "parallel = true\n");
    let from_env = write_config(other.path(), "env.toml", "parallel = false\nuser = \"env\"\n");
    env::set_var(CONFIG_ENV_VAR, &from_env);
    env::set_var(DATASET_ROOT_ENV_VAR, other.path());

    let (config, root) = DatasetConfig::resolve(Some(&cli), Some(dataset.path())).unwrap();
    assert!(config.parallel);
    assert!(config.user.is_none());
    assert_eq!(root, dataset.path());

    clear_env();
}

#[test]
#[serial]
fn test_environment_used_without_cli() {
    clear_env();
    let dataset = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let from_env = write_config(other.path(), "env.toml", "user = \"from-env\"\n");
    env::set_var(CONFIG_ENV_VAR, &from_env);
    env::set_var(DATASET_ROOT_ENV_VAR, dataset.path());

    let (config, root) = DatasetConfig::resolve(None, None).unwrap();
    assert_eq!(config.user.as_deref(), Some("from-env"));
    assert_eq!(root, dataset.path());

    clear_env();
}

#[test]
#[serial]
fn test_dataset_local_config_is_found() {
    clear_env();
    let dataset = TempDir::new().unwrap();
    write_config(
        dataset.path(),
        &format!("data-monitoring/{}", DATASET_CONFIG_FILENAME),
        r#"
visit_data_types = ["psychopy"]
purge_failed_checked = false

[content_checks]
psychopy = "tabular-triplet"

[naming]
allowed_suffixes = ["s1_r1_e1", "s2_r1_e1"]
"#,
    );

    let (config, _) = DatasetConfig::resolve(None, Some(dataset.path())).unwrap();
    assert_eq!(config.visit_data_types, vec!["psychopy"]);
    assert!(!config.purge_failed_checked);
    assert_eq!(config.content_checks.get("psychopy"), Some(&ContentCheck::TabularTriplet));
    assert!(config.content_checks.get("eeg").is_none());
    assert_eq!(config.naming.allowed_suffixes.len(), 2);
    // Unset sections keep their defaults
    assert_eq!(config.naming.subject_pattern, r"^\d+$");
    assert_eq!(config.logging.level, "info");
}

#[test]
#[serial]
fn test_dataset_root_from_config_file() {
    clear_env();
    let dataset = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let cli = write_config(
        other.path(),
        "rdqa.toml",
        &format!("dataset_root = {:?}\n", dataset.path().display().to_string()),
    );

    let (_, root) = DatasetConfig::resolve(Some(&cli), None).unwrap();
    assert_eq!(root, dataset.path());
}

#[test]
#[serial]
fn test_missing_explicit_config_is_error() {
    clear_env();
    let dataset = TempDir::new().unwrap();
    let missing = dataset.path().join("nope.toml");

    let err = DatasetConfig::resolve(Some(&missing), Some(dataset.path())).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("nope.toml")), "{}", err);

    env::set_var(CONFIG_ENV_VAR, &missing);
    let err = DatasetConfig::resolve(None, Some(dataset.path())).unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    clear_env();
}

#[test]
#[serial]
fn test_root_must_be_a_directory() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let file = write_config(dir.path(), "not-a-dir.txt", "x");

    let err = DatasetConfig::resolve(None, Some(&file)).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("not a directory")), "{}", err);

    let err = DatasetConfig::resolve(None, Some(&dir.path().join("absent"))).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_invalid_config_rejected() {
    clear_env();
    let dataset = TempDir::new().unwrap();
    let bad_suffix = write_config(
        dataset.path(),
        "bad.toml",
        "[naming]\nallowed_suffixes = [\"s1_r1\"]\n",
    );
    let err = DatasetConfig::resolve(Some(&bad_suffix), Some(dataset.path())).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("s1_r1")), "{}", err);

    let unparsable = write_config(dataset.path(), "broken.toml", "parallel = \"sometimes\"\n");
    let err = DatasetConfig::resolve(Some(&unparsable), Some(dataset.path())).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("Parse")), "{}", err);
}
