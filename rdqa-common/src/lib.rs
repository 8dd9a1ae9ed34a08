//! # RDQA Common Library
//!
//! Shared code for the research-data QA tools including:
//! - Fatal error taxonomy (schema, drift, configuration faults)
//! - Dataset configuration loading and resolution
//! - Run context (shared run timestamp and user)

pub mod config;
pub mod error;
pub mod time;

pub use config::DatasetConfig;
pub use error::{Error, Result};
pub use time::RunContext;
