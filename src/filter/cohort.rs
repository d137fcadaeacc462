//! Analysis cohort selection.

use crate::data::{SampleRow, SampleTable, Schema};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// `column == value` on a metadata column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equality {
    pub column: String,
    pub value: String,
}

/// A conjunction of equality predicates on metadata columns.
///
/// An empty filter keeps every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortFilter {
    pub predicates: Vec<Equality>,
}

impl Default for CohortFilter {
    /// Melanoma PBMC samples from miraclib-treated subjects.
    fn default() -> Self {
        Self::all()
            .require("condition", "melanoma")
            .require("sample_type", "PBMC")
            .require("treatment", "miraclib")
    }
}

impl CohortFilter {
    /// Filter that keeps every row.
    pub fn all() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Add a `column == value` predicate.
    pub fn require(mut self, column: &str, value: &str) -> Self {
        self.predicates.push(Equality {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Check that every predicate names a column of `schema`.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for p in &self.predicates {
            schema.require(&p.column)?;
        }
        Ok(())
    }

    /// Whether a row satisfies every predicate. Missing cells never match.
    pub fn matches(&self, row: SampleRow<'_>) -> Result<bool> {
        for p in &self.predicates {
            if !row.require(&p.column)?.matches_literal(&p.value) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Rows of `table` inside the cohort.
    pub fn apply(&self, table: &SampleTable) -> Result<SampleTable> {
        self.validate(table.schema())?;
        table.try_filter(|row| self.matches(row))
    }
}

impl std::fmt::Display for CohortFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.predicates.is_empty() {
            return write!(f, "(all samples)");
        }
        let parts: Vec<String> = self
            .predicates
            .iter()
            .map(|p| format!("{} == {}", p.column, p.value))
            .collect();
        write!(f, "{}", parts.join(" & "))
    }
}
