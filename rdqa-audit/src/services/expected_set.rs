//! Expected-set resolution
//!
//! The expected set is the cross product of every observed visit
//! (subject + session/run/event) with every variable whose dataType is a
//! visit data type. Combination rows stand in for their members: each row
//! is satisfied by exactly one present member per visit. A visit with more
//! than one member present expects none of them, so every member's files
//! surface as unexpected until the conflict is resolved.

use crate::models::{CombinationRow, DataDictionary, Identifier};
use crate::types::{ErrorKind, ValidationError};
use std::collections::{BTreeMap, BTreeSet};

/// Identifiers that should exist, plus combination-row findings
#[derive(Debug, Clone, Default)]
pub struct ExpectedSet {
    pub identifiers: BTreeSet<Identifier>,
    pub errors: Vec<ValidationError>,
}

impl ExpectedSet {
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.identifiers.contains(identifier)
    }
}

pub struct ExpectedSetResolver<'a> {
    dictionary: &'a DataDictionary,
    visit_data_types: BTreeSet<String>,
}

impl<'a> ExpectedSetResolver<'a> {
    pub fn new(dictionary: &'a DataDictionary, visit_data_types: &[String]) -> Self {
        Self {
            dictionary,
            visit_data_types: visit_data_types.iter().cloned().collect(),
        }
    }

    /// `str(identifier) + ext` for each expected extension
    pub fn expected_files(&self, identifier: &Identifier) -> Vec<String> {
        self.dictionary.expected_files(identifier)
    }

    fn is_visit_variable(&self, variable: &str) -> bool {
        self.dictionary
            .entry(variable)
            .map_or(false, |e| self.visit_data_types.contains(&e.data_type))
    }

    /// Expand observed identifiers into the full expected set
    pub fn expected_identifiers(&self, present: &BTreeSet<Identifier>) -> ExpectedSet {
        let mut present_by_visit: BTreeMap<Identifier, BTreeSet<&str>> = BTreeMap::new();
        for id in present {
            let variables = present_by_visit.entry(id.visit()).or_default();
            if !id.variable().is_empty() {
                variables.insert(id.variable());
            }
        }

        let combination_members: BTreeSet<&str> = self
            .dictionary
            .combinations()
            .iter()
            .flat_map(|row| row.members.iter().map(String::as_str))
            .collect();

        let plain: Vec<&str> = self
            .dictionary
            .entries()
            .iter()
            .map(|e| e.variable.as_str())
            .filter(|v| self.is_visit_variable(v))
            .filter(|v| !combination_members.contains(v) && !self.dictionary.is_combination_row(v))
            .collect();

        let rows: Vec<&CombinationRow> = self
            .dictionary
            .combinations()
            .iter()
            .filter(|row| row.members.iter().any(|m| self.is_visit_variable(m)))
            .collect();

        let mut expected = ExpectedSet::default();
        for (visit, variables) in &present_by_visit {
            for variable in &plain {
                expected.identifiers.insert(visit.with_variable(*variable));
            }
            for row in &rows {
                self.resolve_combination(visit, row, variables, &mut expected);
            }
        }

        tracing::debug!(
            visits = present_by_visit.len(),
            expected = expected.identifiers.len(),
            "Expected set resolved"
        );
        expected
    }

    fn resolve_combination(
        &self,
        visit: &Identifier,
        row: &CombinationRow,
        variables: &BTreeSet<&str>,
        expected: &mut ExpectedSet,
    ) {
        let found: Vec<&String> = row
            .members
            .iter()
            .filter(|m| variables.contains(m.as_str()))
            .collect();

        match found.split_first() {
            None => {
                let id = visit.with_variable(row.name.as_str());
                expected.errors.push(
                    ValidationError::new(
                        ErrorKind::MissingFile,
                        format!(
                            "No variables present for combination row {}, expected one of [{}]",
                            row.name,
                            row.members.join(", ")
                        ),
                    )
                    .with_identifier(&id),
                );
            }
            Some((only, [])) => {
                expected.identifiers.insert(visit.with_variable(only.as_str()));
            }
            Some((chosen, extra)) => {
                for member in extra {
                    let id = visit.with_variable(member.as_str());
                    expected.errors.push(
                        ValidationError::new(
                            ErrorKind::CombinationError,
                            format!(
                                "Multiple variables present for combination row {}, expected one ({} and {})",
                                row.name, chosen, member
                            ),
                        )
                        .with_identifier(&id),
                    );
                }
            }
        }
    }
}
