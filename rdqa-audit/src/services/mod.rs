//! Service modules for the validation and QA workflow

pub mod dataset_scanner;
pub mod expected_set;
pub mod qa_workflow;
pub mod record_store;
pub mod tree_differ;
pub mod validation_pass;

pub use dataset_scanner::{DatasetScanner, ScanError};
pub use expected_set::{ExpectedSet, ExpectedSetResolver};
pub use qa_workflow::{QaOutcome, QaWorkflow, StageOutcome};
pub use record_store::{latest_snapshot, snapshots, write_atomic, Ledger, Table};
pub use tree_differ::{DiffOutcome, FileGroup, TreeDiffer};
pub use validation_pass::{latest_pending_files, CheckedPassOutcome, RawPassOutcome, ValidationPass};
