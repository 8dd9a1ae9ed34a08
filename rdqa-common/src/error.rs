//! Common error types for RDQA
//!
//! Everything here is fatal: a run that hits one of these aborts before any
//! ledger is finalized. Validation findings are data, not errors, and live in
//! the audit crate's report types.

use thiserror::Error;

/// Common result type for RDQA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Structural faults shared by every RDQA pass
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error (wraps csv::Error)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger or dictionary columns do not match the required schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// Data dictionary differs from the last accepted snapshot
    #[error("Data dictionary drift: {0}")]
    DictionaryDrift(String),

    /// Invalid user input or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}
