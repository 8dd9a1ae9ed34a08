//! Directory-tree differ
//!
//! Compares one layout root (intake or archive) against the expected set.
//!
//! Files are first sorted into groups: a file joins the group of the
//! identifier it names only if it sits in that identifier's canonical
//! directory. Everything else is a naming or placement finding. Groups and
//! expected identifiers are then checked one by one, honoring the
//! exception markers (deviation, no-data, issue).
//!
//! A deviation marker covers its whole directory: no file there, malformed
//! or well named, is reported as unexpected. Missing files are only
//! excused by the marker of their own identifier.

use crate::models::{
    split_extension, DataDictionary, DirectoryKey, Identifier, Layout, MarkerKind, NamingGrammar,
};
use crate::services::dataset_scanner::{belongs_to, DatasetScanner};
use crate::services::expected_set::{ExpectedSet, ExpectedSetResolver};
use crate::types::{ErrorCollector, ErrorKind, ValidationError, ValidationReport};
use rayon::prelude::*;
use rdqa_common::Result;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files attributed to one identifier in its canonical directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    /// Canonical directory, relative to the layout root
    pub directory: PathBuf,
    pub data_type: String,
    /// Correctly named data files (basenames)
    pub files: Vec<String>,
    /// Marker basenames by kind
    pub markers: BTreeMap<MarkerKind, String>,
    /// Malformed files in the same directory carrying this identifier's prefix
    pub extras: Vec<String>,
}

impl FileGroup {
    fn new(directory: PathBuf, data_type: &str) -> Self {
        Self {
            directory,
            data_type: data_type.to_string(),
            files: Vec::new(),
            markers: BTreeMap::new(),
            extras: Vec::new(),
        }
    }

    pub fn has_marker(&self, kind: MarkerKind) -> bool {
        self.markers.contains_key(&kind)
    }

    /// Data files present and no no-data marker
    pub fn has_data(&self) -> bool {
        !self.files.is_empty() && !self.has_marker(MarkerKind::NoData)
    }

    /// Sorted basenames of data files and extras joined by `;`, empty without a deviation marker
    pub fn deviation_string(&self) -> String {
        if !self.has_marker(MarkerKind::Deviation) {
            return String::new();
        }
        let names: BTreeSet<&str> = self
            .files
            .iter()
            .chain(self.extras.iter())
            .map(String::as_str)
            .collect();
        names.into_iter().collect::<Vec<_>>().join(";")
    }

    /// Data file paths under `root`
    pub fn data_paths(&self, root: &Path) -> Vec<PathBuf> {
        let dir = root.join(&self.directory);
        self.files.iter().map(|f| dir.join(f)).collect()
    }

    /// Every file of the group (data, markers, extras) under `root`
    pub fn all_paths(&self, root: &Path) -> Vec<PathBuf> {
        let dir = root.join(&self.directory);
        self.files
            .iter()
            .chain(self.markers.values())
            .chain(self.extras.iter())
            .map(|f| dir.join(f))
            .collect()
    }
}

/// Result of diffing one root
#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    pub report: ValidationReport,
    pub groups: BTreeMap<Identifier, FileGroup>,
    pub expected: BTreeSet<Identifier>,
    pub files_scanned: usize,
}

impl DiffOutcome {
    /// Expected identifiers plus every identifier with a group
    pub fn identifiers(&self) -> BTreeSet<Identifier> {
        self.expected
            .iter()
            .chain(self.groups.keys())
            .cloned()
            .collect()
    }
}

struct MalformedFile {
    directory: PathBuf,
    name: String,
    path: PathBuf,
    identifier: Option<Identifier>,
}

#[derive(Default)]
struct Survey {
    groups: BTreeMap<Identifier, FileGroup>,
    report: ValidationReport,
    malformed: Vec<MalformedFile>,
    deviation_dirs: BTreeSet<PathBuf>,
    observed_dirs: BTreeMap<PathBuf, (DirectoryKey, Vec<String>)>,
}

pub struct TreeDiffer<'a> {
    dictionary: &'a DataDictionary,
    grammar: &'a NamingGrammar,
    resolver: ExpectedSetResolver<'a>,
    layout: Layout,
    parallel: bool,
}

impl<'a> TreeDiffer<'a> {
    pub fn new(
        dictionary: &'a DataDictionary,
        grammar: &'a NamingGrammar,
        visit_data_types: &[String],
        layout: Layout,
    ) -> Self {
        Self {
            dictionary,
            grammar,
            resolver: ExpectedSetResolver::new(dictionary, visit_data_types),
            layout,
            parallel: false,
        }
    }

    /// Check identifiers on the rayon pool, one task per subject
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Diff `root`; an absent root is an empty tree
    pub fn diff(&self, root: &Path) -> Result<DiffOutcome> {
        if !root.is_dir() {
            warn!("{:?} root {} does not exist, nothing to validate", self.layout, root.display());
            return Ok(DiffOutcome::default());
        }

        let files = DatasetScanner::new().scan(root)?;
        let mut survey = Survey::default();
        for relative in &files {
            self.classify_file(root, relative, &mut survey);
        }
        self.settle_malformed(&mut survey);

        let mut present: BTreeSet<Identifier> = survey.groups.keys().cloned().collect();
        present.extend(self.observed_visits(&survey.observed_dirs));

        let ExpectedSet { identifiers: expected, errors } = self.resolver.expected_identifiers(&present);
        let mut report = survey.report;
        report.extend(errors);

        let mut by_subject: BTreeMap<&str, Vec<&Identifier>> = BTreeMap::new();
        for id in expected.iter().chain(survey.groups.keys()) {
            by_subject.entry(id.subject()).or_default().push(id);
        }
        for ids in by_subject.values_mut() {
            ids.sort();
            ids.dedup();
        }

        let groups = &survey.groups;
        let deviation_dirs = &survey.deviation_dirs;
        let check = |ids: &Vec<&Identifier>| -> Vec<ValidationError> {
            ids.iter()
                .flat_map(|id| {
                    let group = groups.get(*id);
                    let covered = group.map_or(false, |g| deviation_dirs.contains(&g.directory));
                    self.check_identifier(root, id, group, expected.contains(id), covered)
                })
                .collect()
        };

        if self.parallel {
            let collector = ErrorCollector::new();
            by_subject.par_iter().for_each(|(_, ids)| collector.extend(check(ids)));
            report.extend(collector.into_report().into_errors());
        } else {
            for ids in by_subject.values() {
                report.extend(check(ids));
            }
        }
        report.normalize();

        info!(
            root = %root.display(),
            files = files.len(),
            groups = survey.groups.len(),
            expected = expected.len(),
            errors = report.len(),
            "Tree diff complete"
        );

        Ok(DiffOutcome {
            report,
            groups: survey.groups,
            expected,
            files_scanned: files.len(),
        })
    }

    fn classify_file(&self, root: &Path, relative: &Path, survey: &mut Survey) {
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = relative.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        let path = root.join(relative);

        if let Some(key) = self.layout.parse_directory(&directory) {
            survey
                .observed_dirs
                .entry(directory.clone())
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push(name.clone());
        }

        if let Some((kind, prefix)) = MarkerKind::from_basename(&name) {
            self.classify_marker(kind, prefix, &name, directory, path, survey);
            return;
        }

        match self.grammar.parse_filename(&name, self.dictionary) {
            Ok((id, _)) => {
                let data_type = self.data_type(&id);
                let canonical = self.layout.directory(Path::new(""), &id, &data_type);
                if canonical == directory {
                    survey
                        .groups
                        .entry(id)
                        .or_insert_with(|| FileGroup::new(canonical, &data_type))
                        .files
                        .push(name);
                } else {
                    survey.report.extend(misplaced(&id, &name, &directory, &canonical, &path));
                }
            }
            Err(e) => {
                let identifier = self.grammar.parse(split_extension(&name).0).ok();
                let mut error = ValidationError::new(ErrorKind::NamingError, e.to_string()).with_path(&path);
                if let Some(id) = &identifier {
                    error = error.with_identifier(id);
                }
                survey.report.push(error);
                survey.malformed.push(MalformedFile { directory, name, path, identifier });
            }
        }
    }

    fn classify_marker(
        &self,
        kind: MarkerKind,
        prefix: &str,
        name: &str,
        directory: PathBuf,
        path: PathBuf,
        survey: &mut Survey,
    ) {
        let parsed = self.grammar.parse(prefix).map_err(|e| e.to_string()).and_then(|id| {
            match self.dictionary.entry(id.variable()) {
                Some(entry) => Ok((id, entry.data_type.clone())),
                None => Err(format!(
                    "Marker '{}' does not name a data dictionary variable",
                    name
                )),
            }
        });

        let (id, data_type) = match parsed {
            Ok(found) => found,
            Err(reason) => {
                survey.report.push(
                    ValidationError::new(
                        ErrorKind::NamingError,
                        format!("Malformed {} marker '{}': {}", kind, name, reason),
                    )
                    .with_path(&path),
                );
                survey.malformed.push(MalformedFile {
                    directory,
                    name: name.to_string(),
                    path,
                    identifier: None,
                });
                return;
            }
        };

        let canonical = self.layout.directory(Path::new(""), &id, &data_type);
        if canonical != directory {
            survey.report.extend(misplaced(&id, name, &directory, &canonical, &path));
            return;
        }

        if kind == MarkerKind::Deviation {
            survey.deviation_dirs.insert(directory);
        }
        survey
            .groups
            .entry(id)
            .or_insert_with(|| FileGroup::new(canonical, &data_type))
            .markers
            .insert(kind, name.to_string());
    }

    /// Attach malformed files to groups by prefix; unexpected unless deviation covers the directory
    fn settle_malformed(&self, survey: &mut Survey) {
        for file in std::mem::take(&mut survey.malformed) {
            for (id, group) in survey.groups.iter_mut() {
                if group.directory == file.directory && belongs_to(&file.name, id) {
                    group.extras.push(file.name.clone());
                }
            }

            if survey.deviation_dirs.contains(&file.directory) {
                debug!("Deviation marker covers malformed file {}", file.path.display());
                continue;
            }

            let mut error = ValidationError::new(
                ErrorKind::UnexpectedFile,
                format!("Unexpected file {} in {}", file.name, display_dir(&file.directory)),
            )
            .with_path(&file.path);
            if let Some(id) = &file.identifier {
                error = error.with_identifier(id);
            }
            survey.report.push(error);
        }
    }

    /// Visit identifiers implied by canonical directories that hold any file
    ///
    /// The subject comes from the directory; the event from a file whose
    /// session and run agree with the directory, else from the single allowed
    /// suffix for that session and run.
    fn observed_visits(
        &self,
        observed: &BTreeMap<PathBuf, (DirectoryKey, Vec<String>)>,
    ) -> BTreeSet<Identifier> {
        let mut visits = BTreeSet::new();
        for (key, names) in observed.values() {
            let mut suffixes: BTreeSet<String> = names
                .iter()
                .filter_map(|name| {
                    let stem = match MarkerKind::from_basename(name) {
                        Some((_, prefix)) => prefix,
                        None => split_extension(name).0,
                    };
                    self.grammar.parse(stem).ok()
                })
                .filter(|id| id.session() == key.session && id.run() == key.run)
                .map(|id| id.suffix())
                .collect();

            if suffixes.is_empty() {
                let head = format!("{}_{}_", key.session, key.run);
                let candidates: Vec<&String> = self
                    .grammar
                    .allowed_suffixes()
                    .iter()
                    .filter(|s| s.starts_with(&head))
                    .collect();
                if let [only] = candidates.as_slice() {
                    suffixes.insert((*only).clone());
                }
            }

            for suffix in suffixes {
                let visit = format!("sub-{}_{}", key.subject, suffix);
                match self.grammar.parse(&visit) {
                    Ok(id) => {
                        visits.insert(id);
                    }
                    Err(e) => debug!("Directory does not imply a valid visit: {}", e),
                }
            }
        }
        visits
    }

    /// `covered`: some deviation marker sits in the group's directory
    fn check_identifier(
        &self,
        root: &Path,
        id: &Identifier,
        group: Option<&FileGroup>,
        is_expected: bool,
        covered: bool,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let directory = match group {
            Some(group) => root.join(&group.directory),
            None => self.layout.directory(root, id, &self.data_type(id)),
        };
        let has = |kind| group.map_or(false, |g| g.has_marker(kind));
        let files: &[String] = match group {
            Some(g) => &g.files,
            None => &[],
        };

        if let Some(issue) = group.and_then(|g| g.markers.get(&MarkerKind::Issue)) {
            let path = directory.join(issue);
            errors.push(
                ValidationError::new(ErrorKind::IssueFileFound, format!("Issue marker found for {}: {}", id, issue))
                    .with_identifier(id)
                    .with_path(&path),
            );
            errors.push(
                ValidationError::new(
                    ErrorKind::UnexpectedFile,
                    format!("Unexpected file {} in {}", issue, display_dir(&directory)),
                )
                .with_identifier(id)
                .with_path(&path),
            );
        }

        let deviation = has(MarkerKind::Deviation);
        let no_data = has(MarkerKind::NoData);

        if deviation && no_data {
            errors.push(
                ValidationError::new(
                    ErrorKind::ExceptionFileError,
                    format!("Both deviation and no-data markers present for {}", id),
                )
                .with_identifier(id)
                .with_path(&directory),
            );
            return errors;
        }

        if no_data {
            for file in files {
                errors.push(
                    ValidationError::new(
                        ErrorKind::UnexpectedFile,
                        format!("File {} present alongside a no-data marker", file),
                    )
                    .with_identifier(id)
                    .with_path(directory.join(file)),
                );
            }
            return errors;
        }

        if deviation {
            let extras = group.map_or(0, |g| g.extras.len());
            if files.is_empty() && extras == 0 {
                let marker = group
                    .and_then(|g| g.markers.get(&MarkerKind::Deviation))
                    .map(|m| directory.join(m))
                    .unwrap_or_else(|| directory.clone());
                errors.push(
                    ValidationError::new(
                        ErrorKind::ExceptionFileError,
                        format!(
                            "Deviation marker for {} without any data files, use {}_{} instead",
                            id,
                            id,
                            MarkerKind::NoData
                        ),
                    )
                    .with_identifier(id)
                    .with_path(marker),
                );
            }
            return errors;
        }

        if !is_expected {
            if covered {
                debug!(identifier = %id, "Deviation marker covers unexpected files");
                return errors;
            }
            for file in files {
                errors.push(
                    ValidationError::new(
                        ErrorKind::UnexpectedFile,
                        format!("Unexpected file {} in {}", file, display_dir(&directory)),
                    )
                    .with_identifier(id)
                    .with_path(directory.join(file)),
                );
            }
            return errors;
        }

        let present: HashSet<String> = files.iter().map(|f| f.to_ascii_lowercase()).collect();
        for expected in self.resolver.expected_files(id) {
            if !present.contains(&expected.to_ascii_lowercase()) {
                errors.push(
                    ValidationError::new(ErrorKind::MissingFile, format!("Missing expected file {}", expected))
                        .with_identifier(id)
                        .with_path(directory.join(&expected)),
                );
            }
        }
        errors
    }

    fn data_type(&self, id: &Identifier) -> String {
        self.dictionary
            .entry(id.variable())
            .map(|e| e.data_type.clone())
            .unwrap_or_default()
    }
}

fn display_dir(directory: &Path) -> String {
    if directory.as_os_str().is_empty() {
        ".".to_string()
    } else {
        directory.display().to_string()
    }
}

fn misplaced(
    id: &Identifier,
    name: &str,
    found: &Path,
    canonical: &Path,
    path: &Path,
) -> [ValidationError; 2] {
    [
        ValidationError::new(
            ErrorKind::MisplacedFile,
            format!(
                "File {} is in {}, expected {}",
                name,
                display_dir(found),
                display_dir(canonical)
            ),
        )
        .with_identifier(id)
        .with_path(path),
        ValidationError::new(
            ErrorKind::UnexpectedFile,
            format!("Unexpected file {} in {}", name, display_dir(found)),
        )
        .with_identifier(id)
        .with_path(path),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdqa_common::config::NamingConfig;
    use std::fs;
    use tempfile::TempDir;

    const DICT: &str = "\
variable,dataType,expectedFileExt,encrypted,provenance
flanker,psychopy,\".csv, .log\",0,file: psychopy
";

    fn fixture() -> (DataDictionary, NamingGrammar) {
        (
            DataDictionary::from_reader(DICT.as_bytes()).unwrap(),
            NamingGrammar::from_config(&NamingConfig::default()).unwrap(),
        )
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_complete_tree_is_clean() {
        let (dict, grammar) = fixture();
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "s1_r1/psychopy/sub-001/sub-001_flanker_s1_r1_e1.csv");
        touch(dir.path(), "s1_r1/psychopy/sub-001/sub-001_flanker_s1_r1_e1.log");

        let differ = TreeDiffer::new(&dict, &grammar, &["psychopy".to_string()], Layout::Intake);
        let outcome = differ.diff(dir.path()).unwrap();
        assert!(outcome.report.is_empty(), "{:?}", outcome.report);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.files_scanned, 2);
    }

    #[test]
    fn test_deviation_string_lists_sorted_files() {
        let mut group = FileGroup::new(PathBuf::from("d"), "psychopy");
        group.files = vec!["b.csv".into(), "a.csv".into()];
        group.extras = vec!["a_old.csv".into()];
        assert_eq!(group.deviation_string(), "");
        group.markers.insert(MarkerKind::Deviation, "x_deviation.txt".into());
        assert_eq!(group.deviation_string(), "a.csv;a_old.csv;b.csv");
    }

    #[test]
    fn test_missing_root_is_empty() {
        let (dict, grammar) = fixture();
        let dir = TempDir::new().unwrap();
        let differ = TreeDiffer::new(&dict, &grammar, &["psychopy".to_string()], Layout::Archive);
        let outcome = differ.diff(&dir.path().join("checked")).unwrap();
        assert!(outcome.report.is_empty());
        assert!(outcome.expected.is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (dict, grammar) = fixture();
        let dir = TempDir::new().unwrap();
        for subject in ["001", "002", "003", "004"] {
            touch(
                dir.path(),
                &format!("s1_r1/psychopy/sub-{0}/sub-{0}_flanker_s1_r1_e1.csv", subject),
            );
        }
        touch(dir.path(), "s1_r1/psychopy/sub-002/notes.txt");

        let types = ["psychopy".to_string()];
        let sequential = TreeDiffer::new(&dict, &grammar, &types, Layout::Intake)
            .diff(dir.path())
            .unwrap();
        let parallel = TreeDiffer::new(&dict, &grammar, &types, Layout::Intake)
            .parallel(true)
            .diff(dir.path())
            .unwrap();
        assert_eq!(sequential.report.errors(), parallel.report.errors());
        assert_eq!(sequential.report.count(ErrorKind::MissingFile), 4);
    }
}
