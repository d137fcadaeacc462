//! Box-plot grid data: one panel per cell type, one box per response group.

use crate::compare::AnalysisSet;
use crate::data::StatResultSet;
use crate::error::{CellCountError, Result};
use crate::present::{cell_type_pvalues, format_pvalue};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Panels per grid row.
pub const GRID_COLUMNS: usize = 3;
/// Height of one grid row in pixels.
pub const ROW_HEIGHT: usize = 300;
/// Width of the whole grid in pixels.
pub const GRID_WIDTH: usize = 1000;
/// Figure title.
pub const GRID_TITLE: &str = "Cell Type Frequencies by Response";

/// Five-number summary plus mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSummary {
    /// Number of values.
    pub n: usize,
    /// Smallest value.
    pub min: f64,
    /// First quartile.
    pub q1: f64,
    /// Median.
    pub median: f64,
    /// Third quartile.
    pub q3: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
}

impl BoxSummary {
    /// Summarise values using linearly interpolated quantiles. `None` if
    /// `values` is empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        Some(Self {
            n,
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
        })
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Relative frequencies of one response group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSeries {
    /// Response label of the group.
    pub label: String,
    /// Relative frequencies, in record order.
    pub values: Vec<f64>,
    /// Box statistics of `values`.
    pub summary: BoxSummary,
}

/// One cell type's panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotPanel {
    /// Cell type shown in the panel.
    pub cell_type: String,
    /// P-value of the annotated term.
    pub p_value: f64,
    /// Panel title, `"{cell_type} (p={p_value})"`.
    pub title: String,
    /// Grid row, 1-based.
    pub row: usize,
    /// Grid column, 1-based.
    pub col: usize,
    /// Groups sorted by label.
    pub groups: Vec<GroupSeries>,
}

/// Layout and data for the whole figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelGrid {
    /// Figure title.
    pub title: String,
    /// Number of grid rows.
    pub nrows: usize,
    /// Number of grid columns.
    pub ncols: usize,
    /// Figure width in pixels.
    pub width: usize,
    /// Figure height in pixels, `ROW_HEIGHT` per row.
    pub height: usize,
    /// Axis label for the response groups.
    pub x_label: String,
    /// Axis label for the relative frequency.
    pub y_label: String,
    /// Panels in row-major order.
    pub panels: Vec<PlotPanel>,
}

impl PanelGrid {
    /// Serialise to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(CellCountError::from)
    }

    /// Write pretty JSON to a file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Build the panel grid for a cohort, annotating each cell type with its
/// p-value for `term`.
///
/// # Errors
/// * `UnknownColumn` if `response_column` is not in the cohort metadata
/// * `InvalidParameter` if a cell type has no result for `term`
/// * `AmbiguousTerm` if it has more than one
pub fn build_panel_grid(
    analysis: &AnalysisSet,
    results: &StatResultSet,
    term: &str,
    response_column: &str,
) -> Result<PanelGrid> {
    analysis.require_column(response_column)?;
    let pvalues = cell_type_pvalues(results, term)?;

    let mut panels = Vec::with_capacity(analysis.cell_types.len());
    for (i, cell_type) in analysis.cell_types.iter().enumerate() {
        let p_value = *pvalues.get(cell_type).ok_or_else(|| {
            CellCountError::InvalidParameter(format!(
                "No '{}' result for cell type '{}'",
                term, cell_type
            ))
        })?;

        let mut by_label: Vec<(String, Vec<f64>)> = Vec::new();
        for record in analysis.for_cell_type(cell_type) {
            let Some(label) = record.get(response_column).and_then(|v| v.label()) else {
                continue;
            };
            match by_label.iter_mut().find(|(l, _)| *l == label) {
                Some((_, values)) => values.push(record.relative_frequency),
                None => by_label.push((label, vec![record.relative_frequency])),
            }
        }
        by_label.sort_by(|a, b| a.0.cmp(&b.0));

        let groups = by_label
            .into_iter()
            .filter_map(|(label, values)| {
                BoxSummary::from_values(&values).map(|summary| GroupSeries {
                    label,
                    values,
                    summary,
                })
            })
            .collect();

        panels.push(PlotPanel {
            cell_type: cell_type.clone(),
            p_value,
            title: format!("{} (p={})", cell_type, format_pvalue(p_value)),
            row: i / GRID_COLUMNS + 1,
            col: i % GRID_COLUMNS + 1,
            groups,
        });
    }

    let nrows = panels.len().div_ceil(GRID_COLUMNS);
    Ok(PanelGrid {
        title: GRID_TITLE.to_string(),
        nrows,
        ncols: GRID_COLUMNS,
        width: GRID_WIDTH,
        height: ROW_HEIGHT * nrows,
        x_label: "Response".to_string(),
        y_label: "Relative Frequency".to_string(),
        panels,
    })
}
