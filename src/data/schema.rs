//! Declared schema for the sample table.
//!
//! The schema is built once from the first ingested dataset. Later batches
//! are validated against it instead of being re-inferred.

use crate::data::value::{ColumnType, Value};
use crate::error::{CellCountError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the sample identifier column.
pub const SAMPLE_COLUMN: &str = "sample";

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new(name: &str, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable,
        }
    }

    /// Column definition for a CREATE TABLE statement.
    pub fn sql_definition(&self) -> String {
        let mut def = format!("{} {}", quote_identifier(&self.name), self.column_type.sql_name());
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        def
    }
}

/// Ordered column definitions for a sample table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    /// Create a schema from column definitions.
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        if columns.is_empty() {
            return Err(CellCountError::EmptyData(
                "Schema must have at least one column".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(CellCountError::SchemaMismatch(format!(
                    "Duplicate column '{}'",
                    col.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Infer a schema from a header and raw text records.
    ///
    /// Each column gets the narrowest type accepting all its present values
    /// and is nullable only if some value is missing.
    pub fn infer(header: &[String], records: &[Vec<String>]) -> Result<Self> {
        let columns = header
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let raw = records.iter().map(move |r| r.get(idx).map(String::as_str).unwrap_or(""));
                let column_type = ColumnType::infer(raw.clone());
                let nullable = raw
                    .map(str::trim)
                    .any(crate::data::value::is_missing_token);
                ColumnSpec::new(name, column_type, nullable)
            })
            .collect();
        Self::new(columns)
    }

    /// All column definitions in order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Position of a column, failing with `UnknownColumn`.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| CellCountError::UnknownColumn(name.to_string()))
    }

    /// Check if a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Get a column definition.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Schema with the given columns removed. Unknown names are ignored.
    pub fn without(&self, names: &[String]) -> Result<Self> {
        Self::new(
            self.columns
                .iter()
                .filter(|c| !names.contains(&c.name))
                .cloned()
                .collect(),
        )
    }

    /// Check that a header names exactly this schema's columns.
    ///
    /// Order may differ. Returns, for each schema column, its position in the header.
    pub fn match_header(&self, header: &[String]) -> Result<Vec<usize>> {
        let extra: Vec<&String> = header.iter().filter(|h| !self.has_column(h)).collect();
        if !extra.is_empty() {
            return Err(CellCountError::SchemaMismatch(format!(
                "Columns not in schema: {:?}",
                extra
            )));
        }
        if header.len() != self.columns.len() {
            let missing: Vec<&str> = self
                .columns
                .iter()
                .filter(|c| !header.contains(&c.name))
                .map(|c| c.name.as_str())
                .collect();
            return Err(CellCountError::SchemaMismatch(format!(
                "Expected {} columns, got {} (missing: {:?})",
                self.columns.len(),
                header.len(),
                missing
            )));
        }
        self.columns
            .iter()
            .map(|c| {
                header.iter().position(|h| *h == c.name).ok_or_else(|| {
                    CellCountError::SchemaMismatch(format!("Missing column '{}'", c.name))
                })
            })
            .collect()
    }

    /// Check that a row of typed values fits this schema.
    pub fn check_row(&self, values: &[Value], row: usize) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(CellCountError::SchemaMismatch(format!(
                "Row {} has {} values, schema has {} columns",
                row,
                values.len(),
                self.columns.len()
            )));
        }
        for (spec, value) in self.columns.iter().zip(values) {
            if value.is_missing() && !spec.nullable {
                return Err(CellCountError::SchemaMismatch(format!(
                    "Row {}: column '{}' is NOT NULL",
                    row, spec.name
                )));
            }
            if !spec.column_type.admits(value) {
                return Err(CellCountError::SchemaMismatch(format!(
                    "Row {}: value '{}' does not fit column '{}' of type {}",
                    row, value, spec.name, spec.column_type
                )));
            }
        }
        Ok(())
    }

    /// CREATE TABLE statement for this schema.
    pub fn create_table_sql(&self, table: &str) -> String {
        let defs: Vec<String> = self.columns.iter().map(ColumnSpec::sql_definition).collect();
        format!(
            "CREATE TABLE {} (\n  {}\n)",
            quote_identifier(table),
            defs.join(",\n  ")
        )
    }
}

/// Quote an SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
