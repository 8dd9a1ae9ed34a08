//! Data models: identifiers, layouts, markers, dictionary and ledger rows

pub mod dictionary;
pub mod identifier;
pub mod layout;
pub mod marker;
pub mod records;

pub use dictionary::{CombinationRow, DataDictionary, DictionaryEntry, DriftStatus};
pub use identifier::{split_extension, Identifier, NamingError, NamingGrammar};
pub use layout::{DirectoryKey, Layout};
pub use marker::MarkerKind;
pub use records::{
    FileRecordRow, LedgerRow, PendingErrorRow, PendingFileRow, QaChecklistEntry, ValidatedFileRow,
};
