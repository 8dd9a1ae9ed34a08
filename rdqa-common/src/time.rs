//! Timestamp utilities and the per-run context
//!
//! Every artifact written by one invocation carries the same timestamp. The
//! value is computed lazily on first use and then frozen for the lifetime of
//! the [`RunContext`], which is passed explicitly to each pass.

use chrono::{DateTime, Local, NaiveDateTime};
use once_cell::sync::OnceCell;

/// Format used for snapshot filenames and ledger `datetime` fields.
///
/// Lexicographic order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Get current local timestamp
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Parse a timestamp written with [`TIMESTAMP_FORMAT`]
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()
}

/// Shared state for one invocation: who is running it and when
#[derive(Debug)]
pub struct RunContext {
    user: String,
    timestamp: OnceCell<String>,
}

impl RunContext {
    /// Create a context whose timestamp is taken on first use
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            timestamp: OnceCell::new(),
        }
    }

    /// Create a context with a fixed timestamp (replays and tests)
    pub fn with_timestamp(user: impl Into<String>, timestamp: impl Into<String>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(timestamp.into());
        Self {
            user: user.into(),
            timestamp: cell,
        }
    }

    /// Build a context for the current process user
    ///
    /// Priority: explicit override, `USER`, `USERNAME`, then `"unknown"`.
    pub fn from_environment(user_override: Option<&str>) -> Self {
        let user = user_override
            .map(str::to_string)
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(user)
    }

    /// User recorded in ledger rows
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Run timestamp, computed on first call
    pub fn timestamp(&self) -> &str {
        self.timestamp
            .get_or_init(|| now().format(TIMESTAMP_FORMAT).to_string())
    }

    /// Filename carrying the run timestamp, e.g. `pending-files-<ts>.csv`
    pub fn stamped_filename(&self, prefix: &str, extension: &str) -> String {
        format!("{}-{}.{}", prefix, self.timestamp(), extension)
    }
}
