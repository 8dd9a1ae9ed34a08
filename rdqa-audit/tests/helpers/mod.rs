//! Test Helper Utilities
//!
//! Throw-away datasets for rdqa-audit integration tests

#![allow(dead_code)]

use rdqa_audit::models::Layout;
use rdqa_audit::AuditContext;
use rdqa_common::{DatasetConfig, RunContext};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Dictionary shared by the integration tests
///
/// `arrow` is a combination row over `arrowA`/`arrowB`; `bbsStatus` is a
/// status-tracking row that is never expected as a file.
pub const DICTIONARY: &str = "\
variable,dataType,expectedFileExt,encrypted,provenance,description
flanker,psychopy,\".csv, .log, .psydat\",0,file: psychopy,Flanker task
rest,eeg,\".eeg, .vhdr, .vmrk\",0,file: eeg,Resting state
arrow,combination,,0,\"variables: arrowA, arrowB\",Arrow task
arrowA,psychopy,.csv,0,file: psychopy,Arrow task form A
arrowB,psychopy,.csv,0,file: psychopy,Arrow task form B
bbsStatus,visit_status,,0,\"visit: bbs; tasks: flanker, rest\",Visit status
";

pub const SUFFIX: &str = "s1_r1_e1";

/// A dataset rooted in a temporary directory
pub struct DatasetFixture {
    pub dir: TempDir,
    pub config: DatasetConfig,
}

impl DatasetFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = DatasetConfig::default();
        let fixture = Self { dir, config };
        fixture.write(&fixture.config.data_dictionary.to_string_lossy(), DICTIONARY);
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Load an audit context (drift guard included)
    pub fn context(&self) -> AuditContext {
        AuditContext::load(self.config.clone(), self.root(), false).expect("load audit context")
    }

    /// Write `content` at a root-relative path, creating parents
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create parents");
        fs::write(&path, content).expect("write file");
        path
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.root().join(relative)).expect("remove file");
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).expect("read file")
    }

    /// Intake directory of a variable for one subject, relative to the root
    pub fn raw_dir(&self, subject: &str, data_type: &str) -> String {
        format!("{}/s1_r1/{}/sub-{}", self.config.layout.raw.display(), data_type, subject)
    }

    /// Archive directory of a variable for one subject, relative to the root
    pub fn checked_dir(&self, subject: &str, data_type: &str) -> String {
        format!("{}/sub-{}/s1_r1/{}", self.config.layout.checked.display(), subject, data_type)
    }

    /// Write one variable's files with valid content into `directory`
    pub fn write_variable(&self, directory: &str, subject: &str, variable: &str) {
        let stem = format!("sub-{}_{}_{}", subject, variable, SUFFIX);
        match variable {
            "flanker" => {
                self.write(&format!("{}/{}.csv", directory, stem), &format!("trial,id,rt\n1,{0},0.41\n2,{0},0.39\n", subject));
                self.write(&format!("{}/{}.log", directory, stem), &format!("12.1 \tEXP \tSaved data to '{}.csv'\n", stem));
                self.write(&format!("{}/{}.psydat", directory, stem), "\u{1}binary");
            }
            "rest" => {
                self.write(
                    &format!("{}/{}.vhdr", directory, stem),
                    &format!("[Common Infos]\nDataFile={0}.eeg\nMarkerFile={0}.vmrk\n", stem),
                );
                self.write(&format!("{}/{}.vmrk", directory, stem), &format!("[Common Infos]\nDataFile={}.eeg\n", stem));
                self.write(&format!("{}/{}.eeg", directory, stem), "\u{0}\u{0}");
            }
            _ => {
                self.write(&format!("{}/{}.csv", directory, stem), &format!("participant\n{}\n", subject));
            }
        }
    }

    /// Every expected file of one visit, in the intake area
    pub fn complete_visit(&self, subject: &str) {
        self.complete_visit_in(Layout::Intake, subject);
    }

    pub fn complete_visit_in(&self, layout: Layout, subject: &str) {
        let dir = |data_type: &str| match layout {
            Layout::Intake => self.raw_dir(subject, data_type),
            Layout::Archive => self.checked_dir(subject, data_type),
        };
        self.write_variable(&dir("psychopy"), subject, "flanker");
        self.write_variable(&dir("psychopy"), subject, "arrowA");
        self.write_variable(&dir("eeg"), subject, "rest");
    }
}

/// Run context with a fixed timestamp
pub fn run_at(timestamp: &str) -> RunContext {
    RunContext::with_timestamp("tester", timestamp)
}
