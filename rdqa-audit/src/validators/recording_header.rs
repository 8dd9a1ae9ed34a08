//! Recording header validator
//!
//! A recording is a `.vhdr` header, a `.vmrk` marker file and an `.eeg`
//! data file. The header names its marker and data siblings
//! (`MarkerFile=`, `DataFile=`) and the marker file names the data file
//! (`DataFile=`). Every declared name must equal the expected sibling
//! exactly, otherwise the recording cannot be opened after a rename.

use super::{file_name, find, identify, read_text, ContentCheckError, ContentValidator};
use crate::models::{Identifier, NamingGrammar};
use crate::types::{ErrorKind, ValidationError};
use std::path::{Path, PathBuf};

pub const HEADER_EXTENSION: &str = ".vhdr";
pub const MARKER_EXTENSION: &str = ".vmrk";
pub const DATA_EXTENSION: &str = ".eeg";

pub struct RecordingHeaderValidator {
    grammar: NamingGrammar,
}

impl RecordingHeaderValidator {
    pub fn new(grammar: NamingGrammar) -> Self {
        Self { grammar }
    }

    fn check_reference(
        id: &Identifier,
        path: &Path,
        content: &str,
        key: &str,
        extension: &str,
    ) -> Option<ValidationError> {
        let expected = format!("{}{}", id, extension);
        let message = match declared_value(content, key) {
            Some(value) if value == expected => return None,
            Some(value) => format!(
                "{} declares {}={}, expected {}",
                file_name(path),
                key,
                value,
                expected
            ),
            None => format!("{} has no {}= entry, expected {}", file_name(path), key, expected),
        };
        Some(
            ValidationError::new(ErrorKind::ContentError, message)
                .with_identifier(id)
                .with_path(path),
        )
    }
}

/// Value of the first `key=value` line (key match is case-sensitive)
fn declared_value<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        (k.trim() == key).then(|| v.trim())
    })
}

impl ContentValidator for RecordingHeaderValidator {
    fn name(&self) -> &'static str {
        "recording-header"
    }

    fn validate(&self, files: &[PathBuf]) -> Result<Vec<ValidationError>, ContentCheckError> {
        let Some((id, files)) = identify(&self.grammar, files)? else {
            return Ok(Vec::new());
        };

        let mut errors = Vec::new();
        if let Some(header) = find(&files, HEADER_EXTENSION) {
            let content = read_text(header)?;
            errors.extend(Self::check_reference(&id, header, &content, "MarkerFile", MARKER_EXTENSION));
            errors.extend(Self::check_reference(&id, header, &content, "DataFile", DATA_EXTENSION));
        }
        if let Some(marker) = find(&files, MARKER_EXTENSION) {
            let content = read_text(marker)?;
            errors.extend(Self::check_reference(&id, marker, &content, "DataFile", DATA_EXTENSION));
        }
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdqa_common::config::NamingConfig;
    use std::fs;
    use tempfile::TempDir;

    const STEM: &str = "sub-001_rest_s1_r1_e1";

    fn validator() -> RecordingHeaderValidator {
        RecordingHeaderValidator::new(NamingGrammar::from_config(&NamingConfig::default()).unwrap())
    }

    fn header(marker: &str, data: &str) -> String {
        format!(
            "Brain Vision Data Exchange Header File Version 1.0\n\n[Common Infos]\nDataFile={}\nMarkerFile={}\n",
            data, marker
        )
    }

    fn write(dir: &TempDir, ext: &str, content: &str) -> PathBuf {
        let path = dir.path().join(format!("{}{}", STEM, ext));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_consistent_recording() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write(&dir, ".vhdr", &header(&format!("{}.vmrk", STEM), &format!("{}.eeg", STEM))),
            write(&dir, ".vmrk", &format!("[Common Infos]\nDataFile={}.eeg\n", STEM)),
            write(&dir, ".eeg", ""),
        ];
        assert!(validator().validate(&files).unwrap().is_empty());
    }

    #[test]
    fn test_stale_references_after_rename() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write(&dir, ".vhdr", &header("old.vmrk", "old.eeg")),
            write(&dir, ".vmrk", "DataFile=old.eeg\n"),
        ];
        let errors = validator().validate(&files).unwrap();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.kind == ErrorKind::ContentError));
        assert!(errors[0].message.contains("MarkerFile=old.vmrk"));
    }

    #[test]
    fn test_missing_header_skips_header_checks() {
        let dir = TempDir::new().unwrap();
        let files = vec![write(&dir, ".vmrk", "DataFile=wrong.eeg\n")];
        let errors = validator().validate(&files).unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].path.as_ref().unwrap().ends_with(format!("{}.vmrk", STEM)));
    }

    #[test]
    fn test_header_without_keys() {
        let dir = TempDir::new().unwrap();
        let files = vec![write(&dir, ".vhdr", "[Common Infos]\n")];
        let errors = validator().validate(&files).unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("no MarkerFile= entry"));
    }

    #[test]
    fn test_malformed_filename_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("recording.vhdr");
        fs::write(&path, header("a", "b")).unwrap();
        assert!(matches!(
            validator().validate(&[path]),
            Err(ContentCheckError::MalformedFilename { .. })
        ));
    }
}
