//! Directory layout strategies
//!
//! Intake and archive nest subject and session in opposite orders:
//! - intake:  `<session>_<run>/<dataType>/sub-<subject>/`
//! - archive: `sub-<subject>/<session>_<run>/<dataType>/`

use super::identifier::{Identifier, SUBJECT_PREFIX};
use std::path::{Component, Path, PathBuf};

/// Where an identifier's files live under a root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Raw intake and the QA holding area
    Intake,
    /// Checked archive
    Archive,
}

/// Components recovered from a canonical directory path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryKey {
    pub subject: String,
    pub session: String,
    pub run: String,
    pub data_type: String,
}

impl Layout {
    /// Canonical directory of `identifier` (whose variable has `data_type`)
    pub fn directory(&self, root: &Path, identifier: &Identifier, data_type: &str) -> PathBuf {
        let subject_dir = format!("{}{}", SUBJECT_PREFIX, identifier.subject());
        match self {
            Layout::Intake => root
                .join(identifier.session_run())
                .join(data_type)
                .join(subject_dir),
            Layout::Archive => root
                .join(subject_dir)
                .join(identifier.session_run())
                .join(data_type),
        }
    }

    /// Inverse of [`Layout::directory`] for a root-relative directory
    ///
    /// Returns `None` when the path is not exactly three levels deep or a
    /// level does not have the expected shape.
    pub fn parse_directory(&self, relative: &Path) -> Option<DirectoryKey> {
        let parts: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        let [first, second, third] = parts.as_slice() else {
            return None;
        };

        let (session_run, data_type, subject_dir) = match self {
            Layout::Intake => (*first, *second, *third),
            Layout::Archive => (*second, *third, *first),
        };

        let subject = subject_dir.strip_prefix(SUBJECT_PREFIX)?;
        let (session, run) = session_run.split_once('_')?;
        if subject.is_empty() || session.is_empty() || run.is_empty() || run.contains('_') {
            return None;
        }

        Some(DirectoryKey {
            subject: subject.to_string(),
            session: session.to_string(),
            run: run.to_string(),
            data_type: data_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Identifier {
        Identifier::new("001", "flanker", "s1", "r1", "e1")
    }

    #[test]
    fn test_intake_directory() {
        let dir = Layout::Intake.directory(Path::new("raw"), &id(), "psychopy");
        assert_eq!(dir, PathBuf::from("raw/s1_r1/psychopy/sub-001"));
    }

    #[test]
    fn test_archive_directory_inverts_nesting() {
        let dir = Layout::Archive.directory(Path::new("checked"), &id(), "psychopy");
        assert_eq!(dir, PathBuf::from("checked/sub-001/s1_r1/psychopy"));
    }

    #[test]
    fn test_parse_directory_round_trips_both_layouts() {
        for layout in [Layout::Intake, Layout::Archive] {
            let dir = layout.directory(Path::new(""), &id(), "eeg");
            let key = layout.parse_directory(&dir).unwrap();
            assert_eq!(key.subject, "001");
            assert_eq!(key.session, "s1");
            assert_eq!(key.run, "r1");
            assert_eq!(key.data_type, "eeg");
        }
    }

    #[test]
    fn test_parse_directory_rejects_wrong_depth_and_shape() {
        assert!(Layout::Intake.parse_directory(Path::new("s1_r1/psychopy")).is_none());
        assert!(Layout::Intake.parse_directory(Path::new("s1_r1/psychopy/001")).is_none());
        assert!(Layout::Archive.parse_directory(Path::new("s1_r1/psychopy/sub-001")).is_none());
        assert!(Layout::Intake
            .parse_directory(Path::new("s1_r1/psychopy/sub-001/extra"))
            .is_none());
    }
}
