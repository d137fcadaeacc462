//! Joining frequencies back to sample metadata.

use crate::data::{FrequencyRecord, FrequencyTable, SampleTable, Value, SAMPLE_COLUMN};
use crate::error::{CellCountError, Result};
use crate::filter::CohortFilter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A frequency record with the metadata of its sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Sample identifier.
    pub sample: String,
    /// Sum of all cell-type counts of the sample.
    pub total_count: u64,
    /// Cell type of this record.
    pub cell_type: String,
    /// Raw count of the cell type.
    pub count: u64,
    /// Percentage of `total_count`, 2 decimals.
    pub relative_frequency: f64,
    /// Metadata columns of the sample, without raw counts or the identifier.
    pub metadata: BTreeMap<String, Value>,
}

impl AnalysisRecord {
    /// Metadata value of a column. `None` if the column is not present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.metadata.get(column)
    }
}

/// Records of the analysis cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSet {
    /// Records in frequency-table order.
    pub records: Vec<AnalysisRecord>,
    /// Cell types in order of first appearance.
    pub cell_types: Vec<String>,
    /// Metadata columns carried by every record.
    pub metadata_columns: Vec<String>,
}

impl AnalysisSet {
    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records of one cell type.
    pub fn for_cell_type<'a>(
        &'a self,
        cell_type: &'a str,
    ) -> impl Iterator<Item = &'a AnalysisRecord> + 'a {
        self.records.iter().filter(move |r| r.cell_type == cell_type)
    }

    /// Fail with `UnknownColumn` unless `column` is a metadata column.
    pub fn require_column(&self, column: &str) -> Result<()> {
        if self.metadata_columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(CellCountError::UnknownColumn(column.to_string()))
        }
    }
}

/// Inner-join frequencies with metadata rows on `sample`, keeping only the
/// cohort.
///
/// Cell-type count columns are dropped from the metadata first so that raw
/// counts never sit next to frequencies. A sample with several metadata
/// rows yields one record per row.
///
/// # Errors
/// * `UnknownColumn` if a cohort predicate or the sample column is absent
/// * `InsufficientData` if no record falls in the cohort
pub fn join_frequencies(
    frequencies: &FrequencyTable,
    metadata: &SampleTable,
    cell_type_columns: &[String],
    cohort: &CohortFilter,
) -> Result<AnalysisSet> {
    metadata.schema().require(SAMPLE_COLUMN)?;
    let count_columns: Vec<String> = cell_type_columns
        .iter()
        .filter(|c| metadata.schema().has_column(c))
        .cloned()
        .collect();
    let metadata = metadata.drop_columns(&count_columns)?;
    let in_cohort = cohort.apply(&metadata)?;

    let metadata_columns: Vec<String> = in_cohort
        .column_names()
        .into_iter()
        .filter(|c| c != SAMPLE_COLUMN)
        .collect();

    let mut by_sample: HashMap<String, Vec<BTreeMap<String, Value>>> = HashMap::new();
    for row in in_cohort.iter() {
        let Some(sample) = row.sample_id() else {
            continue;
        };
        let values = metadata_columns
            .iter()
            .map(|c| Ok((c.clone(), row.require(c)?.clone())))
            .collect::<Result<BTreeMap<_, _>>>()?;
        by_sample.entry(sample).or_default().push(values);
    }

    let mut records = Vec::new();
    let mut cell_types: Vec<String> = Vec::new();
    for freq in frequencies.iter() {
        let Some(rows) = by_sample.get(&freq.sample) else {
            continue;
        };
        if !cell_types.contains(&freq.cell_type) {
            cell_types.push(freq.cell_type.clone());
        }
        for meta in rows {
            records.push(joined(freq, meta.clone()));
        }
    }

    if records.is_empty() {
        return Err(CellCountError::InsufficientData(format!(
            "No samples in cohort '{}'",
            cohort
        )));
    }

    Ok(AnalysisSet {
        records,
        cell_types,
        metadata_columns,
    })
}

fn joined(freq: &FrequencyRecord, metadata: BTreeMap<String, Value>) -> AnalysisRecord {
    AnalysisRecord {
        sample: freq.sample.clone(),
        total_count: freq.total_count,
        cell_type: freq.cell_type.clone(),
        count: freq.count,
        relative_frequency: freq.relative_frequency,
        metadata,
    }
}
