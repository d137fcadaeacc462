//! Relative frequencies of cell types per sample.
//!
//! Turns the wide table of raw counts (one column per cell type) into a long
//! table with one row per (sample, cell type) and the percentage that cell
//! type makes up of the sample's total count.

use crate::data::sample_table::SampleTable;
use crate::data::schema::SAMPLE_COLUMN;
use crate::data::value::Value;
use crate::error::{CellCountError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One cell type's share of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRecord {
    /// Sample identifier.
    pub sample: String,
    /// Sum of all cell-type counts for the sample.
    pub total_count: u64,
    /// Cell type (count column name).
    pub cell_type: String,
    /// Count for this cell type.
    pub count: u64,
    /// `100 * count / total_count`, rounded to 2 decimals.
    pub relative_frequency: f64,
}

/// Long-format relative frequency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyTable {
    /// Records ordered by sample, then cell type.
    pub records: Vec<FrequencyRecord>,
    /// Cell types in the order they were requested.
    pub cell_types: Vec<String>,
}

impl FrequencyTable {
    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records.
    pub fn iter(&self) -> impl Iterator<Item = &FrequencyRecord> {
        self.records.iter()
    }

    /// Distinct sample identifiers in output order.
    pub fn samples(&self) -> Vec<&str> {
        let mut samples: Vec<&str> = self.records.iter().map(|r| r.sample.as_str()).collect();
        samples.dedup();
        samples
    }

    /// Records belonging to one sample.
    pub fn for_sample<'a>(&'a self, sample: &'a str) -> impl Iterator<Item = &'a FrequencyRecord> + 'a {
        self.records.iter().filter(move |r| r.sample == sample)
    }

    /// Write the table as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "sample\ttotal_count\tcell_type\tcount\trelative_frequency")?;
        for r in &self.records {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{:.2}",
                r.sample, r.total_count, r.cell_type, r.count, r.relative_frequency
            )?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Compute per-sample relative frequencies of the given cell-type columns.
///
/// Rows sharing a sample identifier are summed before the ratio is taken.
/// Samples come out in sorted order, cell types in the order given.
///
/// # Errors
/// * `InvalidParameter` if `cell_type_columns` is empty, repeats a name or
///   names the sample column
/// * `UnknownColumn` if a requested column is absent
/// * `MissingValue` if a count (or a sample identifier) is missing
/// * `InvalidValue` if a count is negative or fractional
/// * `DivisionByZero` if a sample's total count is zero
/// * `Numerical` if a per-sample sum exceeds the count range
pub fn compute_frequencies(
    table: &SampleTable,
    cell_type_columns: &[String],
) -> Result<FrequencyTable> {
    validate_cell_type_columns(table, cell_type_columns)?;

    let mut per_sample: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for (row_idx, row) in table.iter().enumerate() {
        let sample = row.sample_id().ok_or_else(|| CellCountError::MissingValue {
            sample: format!("<row {}>", row_idx),
            column: SAMPLE_COLUMN.to_string(),
        })?;
        let mut counts = Vec::with_capacity(cell_type_columns.len());
        for column in cell_type_columns {
            counts.push(count_value(row.require(column)?, &sample, column, row_idx)?);
        }
        let sums = per_sample
            .entry(sample.clone())
            .or_insert_with(|| vec![0; cell_type_columns.len()]);
        for (i, count) in counts.into_iter().enumerate() {
            sums[i] = sums[i]
                .checked_add(count)
                .ok_or_else(|| count_overflow(&sample, &cell_type_columns[i]))?;
        }
    }

    let mut records = Vec::with_capacity(per_sample.len() * cell_type_columns.len());
    for (sample, sums) in per_sample {
        let total_count = sums
            .iter()
            .try_fold(0u64, |acc, &c| acc.checked_add(c))
            .ok_or_else(|| count_overflow(&sample, "total_count"))?;
        if total_count == 0 {
            return Err(CellCountError::DivisionByZero { sample });
        }
        for (cell_type, count) in cell_type_columns.iter().zip(sums) {
            records.push(FrequencyRecord {
                sample: sample.clone(),
                total_count,
                cell_type: cell_type.clone(),
                count,
                relative_frequency: round2(100.0 * count as f64 / total_count as f64),
            });
        }
    }

    Ok(FrequencyTable {
        records,
        cell_types: cell_type_columns.to_vec(),
    })
}

/// Check the cell-type column list against a table.
pub fn validate_cell_type_columns(table: &SampleTable, cell_type_columns: &[String]) -> Result<()> {
    if cell_type_columns.is_empty() {
        return Err(CellCountError::InvalidParameter(
            "At least one cell-type column is required".to_string(),
        ));
    }
    for (idx, column) in cell_type_columns.iter().enumerate() {
        if column == SAMPLE_COLUMN {
            return Err(CellCountError::InvalidParameter(format!(
                "'{}' is the sample identifier, not a cell-type column",
                SAMPLE_COLUMN
            )));
        }
        if cell_type_columns[..idx].contains(column) {
            return Err(CellCountError::InvalidParameter(format!(
                "Cell-type column '{}' listed twice",
                column
            )));
        }
        table.schema().require(column)?;
    }
    table.schema().require(SAMPLE_COLUMN)?;
    Ok(())
}

fn count_value(value: &Value, sample: &str, column: &str, row: usize) -> Result<u64> {
    let invalid = || CellCountError::InvalidValue {
        value: value.to_string(),
        column: column.to_string(),
        row,
    };
    match value {
        Value::Missing => Err(CellCountError::MissingValue {
            sample: sample.to_string(),
            column: column.to_string(),
        }),
        Value::Integer(n) => u64::try_from(*n).map_err(|_| invalid()),
        Value::Real(x) if *x >= 0.0 && x.fract() == 0.0 && x.is_finite() => Ok(*x as u64),
        _ => Err(invalid()),
    }
}

fn count_overflow(sample: &str, column: &str) -> CellCountError {
    CellCountError::Numerical(format!(
        "Count sum for sample '{}' overflows in column '{}'",
        sample, column
    ))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
