//! Identifier naming grammar
//!
//! Canonical form: `sub-<subject>[_<variable>]_<session>_<run>_<event>`.
//! The grammar is a value built from [`NamingConfig`]; variant grammars are
//! just different configurations.

use crate::models::DataDictionary;
use rdqa_common::config::NamingConfig;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Prefix of the subject token
pub const SUBJECT_PREFIX: &str = "sub-";

/// Naming grammar violations, one variant per offending token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("'{name}' does not match sub-<subject>[_<variable>]_<session>_<run>_<event>: {reason}")]
    FormatMismatch { name: String, reason: String },

    #[error("'{name}' has invalid subject number '{subject}'")]
    InvalidSubject { name: String, subject: String },

    #[error("'{name}' has suffix '{suffix}' which is not an allowed session_run_event combination")]
    SuffixNotAllowed { name: String, suffix: String },

    #[error("'{name}' has extension '{extension}', expected one of [{}]", expected.join(", "))]
    ExtensionMismatch {
        name: String,
        extension: String,
        expected: Vec<String>,
    },

    #[error("'{name}' names variable '{variable}' which is not in the data dictionary")]
    UnknownVariable { name: String, variable: String },
}

/// Parsed `subject_variable_session_run_event` token
///
/// Immutable; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    subject: String,
    variable: String,
    session: String,
    run: String,
    event: String,
}

impl Identifier {
    /// Build an identifier from its fields (no grammar check)
    pub fn new(
        subject: impl Into<String>,
        variable: impl Into<String>,
        session: impl Into<String>,
        run: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            variable: variable.into(),
            session: session.into(),
            run: run.into(),
            event: event.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// `<session>_<run>_<event>`
    pub fn suffix(&self) -> String {
        format!("{}_{}_{}", self.session, self.run, self.event)
    }

    /// `<session>_<run>` directory component
    pub fn session_run(&self) -> String {
        format!("{}_{}", self.session, self.run)
    }

    /// Same subject and visit, different variable
    pub fn with_variable(&self, variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            ..self.clone()
        }
    }

    /// Subject-level identifier for this visit (empty variable)
    pub fn visit(&self) -> Self {
        self.with_variable("")
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SUBJECT_PREFIX, self.subject)?;
        if !self.variable.is_empty() {
            write!(f, "_{}", self.variable)?;
        }
        write!(f, "_{}_{}_{}", self.session, self.run, self.event)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Compiled naming grammar
#[derive(Debug, Clone)]
pub struct NamingGrammar {
    subject: Regex,
    session: Regex,
    run: Regex,
    event: Regex,
    allowed_suffixes: BTreeSet<String>,
}

impl NamingGrammar {
    /// Compile the grammar from configuration
    pub fn from_config(config: &NamingConfig) -> rdqa_common::Result<Self> {
        let compile = |label: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                rdqa_common::Error::Config(format!("naming.{} '{}' is not a valid regex: {}", label, pattern, e))
            })
        };

        Ok(Self {
            subject: compile("subject_pattern", &config.subject_pattern)?,
            session: compile("session_pattern", &config.session_pattern)?,
            run: compile("run_pattern", &config.run_pattern)?,
            event: compile("event_pattern", &config.event_pattern)?,
            allowed_suffixes: config.allowed_suffixes.iter().cloned().collect(),
        })
    }

    /// Allowed `session_run_event` combinations
    pub fn allowed_suffixes(&self) -> &BTreeSet<String> {
        &self.allowed_suffixes
    }

    /// Parse a bare identifier string
    pub fn parse(&self, name: &str) -> Result<Identifier, NamingError> {
        let mismatch = |reason: String| NamingError::FormatMismatch {
            name: name.to_string(),
            reason,
        };

        let tokens: Vec<&str> = name.split('_').collect();
        let subject = tokens[0]
            .strip_prefix(SUBJECT_PREFIX)
            .ok_or_else(|| mismatch(format!("missing '{}' prefix", SUBJECT_PREFIX)))?;

        let (variable, visit) = match tokens.len() {
            4 => ("", &tokens[1..]),
            5 => (tokens[1], &tokens[2..]),
            n if n < 4 => {
                return Err(mismatch(format!("missing token, found {} of 4-5", n)));
            }
            n => return Err(mismatch(format!("too many tokens, found {} of 4-5", n))),
        };

        if tokens.iter().any(|t| t.is_empty()) {
            return Err(mismatch("empty token".to_string()));
        }

        if subject.is_empty() || !self.subject.is_match(subject) {
            return Err(NamingError::InvalidSubject {
                name: name.to_string(),
                subject: subject.to_string(),
            });
        }

        let (session, run, event) = (visit[0], visit[1], visit[2]);
        for (label, token, pattern) in [
            ("session", session, &self.session),
            ("run", run, &self.run),
            ("event", event, &self.event),
        ] {
            if !pattern.is_match(token) {
                return Err(mismatch(format!("{} token '{}' is malformed", label, token)));
            }
        }

        let suffix = visit.join("_");
        if !self.allowed_suffixes.contains(&suffix) {
            return Err(NamingError::SuffixNotAllowed {
                name: name.to_string(),
                suffix,
            });
        }

        Ok(Identifier::new(subject, variable, session, run, event))
    }

    /// Parse a data filename against the grammar and the dictionary
    ///
    /// The extension is everything from the first `.` and must match the
    /// variable's expected extensions case-insensitively.
    pub fn parse_filename(
        &self,
        basename: &str,
        dictionary: &DataDictionary,
    ) -> Result<(Identifier, String), NamingError> {
        let (stem, extension) = split_extension(basename);
        let identifier = self.parse(stem)?;

        let entry = dictionary
            .entry(identifier.variable())
            .ok_or_else(|| NamingError::UnknownVariable {
                name: basename.to_string(),
                variable: identifier.variable().to_string(),
            })?;

        let matches = entry
            .expected_file_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension));
        if !matches {
            return Err(NamingError::ExtensionMismatch {
                name: basename.to_string(),
                extension: extension.to_string(),
                expected: entry.expected_file_extensions.clone(),
            });
        }

        Ok((identifier, extension.to_string()))
    }
}

/// Split `name.ext.more` into (`name`, `.ext.more`)
pub fn split_extension(basename: &str) -> (&str, &str) {
    match basename.find('.') {
        Some(idx) => (&basename[..idx], &basename[idx..]),
        None => (basename, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> NamingGrammar {
        let config = NamingConfig {
            subject_pattern: r"^\d{3}$".to_string(),
            allowed_suffixes: vec!["s1_r1_e1".to_string(), "s2_r1_e1".to_string()],
            ..NamingConfig::default()
        };
        NamingGrammar::from_config(&config).unwrap()
    }

    #[test]
    fn test_parse_and_display_with_variable() {
        let id = grammar().parse("sub-001_flanker_s1_r1_e1").unwrap();
        assert_eq!(id.subject(), "001");
        assert_eq!(id.variable(), "flanker");
        assert_eq!(id.suffix(), "s1_r1_e1");
        assert_eq!(id.session_run(), "s1_r1");
        assert_eq!(id.to_string(), "sub-001_flanker_s1_r1_e1");
    }

    #[test]
    fn test_parse_without_variable() {
        let id = grammar().parse("sub-001_s2_r1_e1").unwrap();
        assert_eq!(id.variable(), "");
        assert_eq!(id.to_string(), "sub-001_s2_r1_e1");
    }

    #[test]
    fn test_invalid_subject_names_the_token() {
        let err = grammar().parse("sub-01_flanker_s1_r1_e1").unwrap_err();
        assert!(matches!(err, NamingError::InvalidSubject { ref subject, .. } if subject == "01"));
        assert!(err.to_string().contains("'01'"));
    }

    #[test]
    fn test_suffix_not_allowed() {
        let err = grammar().parse("sub-001_flanker_s3_r1_e1").unwrap_err();
        assert!(matches!(err, NamingError::SuffixNotAllowed { ref suffix, .. } if suffix == "s3_r1_e1"));
    }

    #[test]
    fn test_missing_token() {
        let err = grammar().parse("sub-001_flanker_s1_r1").unwrap_err();
        assert!(matches!(err, NamingError::FormatMismatch { .. }));
        let err = grammar().parse("sub-001_s1").unwrap_err();
        assert!(err.to_string().contains("missing token"));
    }

    #[test]
    fn test_missing_prefix() {
        let err = grammar().parse("001_flanker_s1_r1_e1").unwrap_err();
        assert!(err.to_string().contains("'sub-' prefix"));
    }

    #[test]
    fn test_equality_is_structural() {
        let parsed = grammar().parse("sub-001_flanker_s1_r1_e1").unwrap();
        let built = Identifier::new("001", "flanker", "s1", "r1", "e1");
        assert_eq!(parsed, built);
        assert_ne!(parsed, built.with_variable("arrow"));
    }

    #[test]
    fn test_grammar_is_configuration() {
        let alpha = NamingGrammar::from_config(&NamingConfig {
            subject_pattern: r"^[A-Z]{2}\d{2}$".to_string(),
            ..NamingConfig::default()
        })
        .unwrap();
        assert!(alpha.parse("sub-AB12_flanker_s1_r1_e1").is_ok());
        assert!(grammar().parse("sub-AB12_flanker_s1_r1_e1").is_err());
    }

    #[test]
    fn test_bad_regex_is_config_error() {
        let result = NamingGrammar::from_config(&NamingConfig {
            subject_pattern: "(".to_string(),
            ..NamingConfig::default()
        });
        assert!(matches!(result, Err(rdqa_common::Error::Config(_))));
    }

    #[test]
    fn test_split_extension_takes_first_dot() {
        assert_eq!(split_extension("a.tar.gz"), ("a", ".tar.gz"));
        assert_eq!(split_extension("plain"), ("plain", ""));
    }
}
