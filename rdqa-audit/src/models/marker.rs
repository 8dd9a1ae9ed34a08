//! Exception marker files
//!
//! A marker is an empty-or-text file named `<identifier>_<kind>.txt` sitting
//! next to (or instead of) the identifier's data files.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerKind {
    /// Files differ from the dictionary on purpose; suppresses missing/unexpected
    Deviation,
    /// Visit happened but produced no data; suppresses missing
    NoData,
    /// Open problem; always reported
    Issue,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 3] = [MarkerKind::Deviation, MarkerKind::NoData, MarkerKind::Issue];

    /// Marker filename tail, e.g. `deviation.txt`
    pub fn file_name(&self) -> &'static str {
        match self {
            MarkerKind::Deviation => "deviation.txt",
            MarkerKind::NoData => "no-data.txt",
            MarkerKind::Issue => "issue.txt",
        }
    }

    /// Split `<prefix>_<kind>.txt` into (kind, prefix); `prefix` may be empty
    pub fn from_basename(basename: &str) -> Option<(MarkerKind, &str)> {
        let lower = basename.to_ascii_lowercase();
        MarkerKind::ALL.into_iter().find_map(|kind| {
            if !lower.ends_with(kind.file_name()) {
                return None;
            }
            let head = &basename[..basename.len() - kind.file_name().len()];
            match head.strip_suffix('_') {
                Some(prefix) => Some((kind, prefix)),
                None if head.is_empty() => Some((kind, "")),
                None => None,
            }
        })
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_basename() {
        assert_eq!(
            MarkerKind::from_basename("sub-001_flanker_s1_r1_e1_deviation.txt"),
            Some((MarkerKind::Deviation, "sub-001_flanker_s1_r1_e1"))
        );
        assert_eq!(
            MarkerKind::from_basename("sub-001_eeg_s1_r1_e1_no-data.txt"),
            Some((MarkerKind::NoData, "sub-001_eeg_s1_r1_e1"))
        );
        assert_eq!(MarkerKind::from_basename("issue.txt"), Some((MarkerKind::Issue, "")));
        assert_eq!(MarkerKind::from_basename("sub-001_notes.txt"), None);
        assert_eq!(MarkerKind::from_basename("mydeviation.txt"), None);
    }
}
