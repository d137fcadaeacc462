//! Result types for group comparisons.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Significance band used to highlight a statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    /// p < 0.001
    VeryHigh,
    /// p < 0.01
    High,
    /// p < 0.05
    Moderate,
    /// p < 0.10
    Low,
    /// Not significant
    NotSignificant,
}

impl Significance {
    /// Classify a p-value.
    pub fn from_pvalue(p: f64) -> Self {
        if p < 0.001 {
            Self::VeryHigh
        } else if p < 0.01 {
            Self::High
        } else if p < 0.05 {
            Self::Moderate
        } else if p < 0.10 {
            Self::Low
        } else {
            Self::NotSignificant
        }
    }

    /// Get the descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VeryHigh => "very_high",
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Low => "low",
            Self::NotSignificant => "not_significant",
        }
    }

    /// Check if significant at alpha = 0.05.
    pub fn is_significant(&self) -> bool {
        matches!(self, Self::VeryHigh | Self::High | Self::Moderate)
    }
}

/// Test outcome for one (cell type, term) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatResult {
    /// Cell type the test was run on.
    pub cell_type: String,
    /// Tested term. Rank tests use the response column name.
    pub term: String,
    /// Name of the test that produced this row.
    pub method: String,
    /// Sum of squares (ANOVA only).
    pub sum_sq: Option<f64>,
    /// Degrees of freedom (ANOVA only).
    pub df: Option<f64>,
    /// Test statistic: F for ANOVA, U for the rank test.
    pub statistic: Option<f64>,
    /// P-value.
    pub p_value: f64,
    /// Highlight band for `p_value`.
    pub significance: Significance,
}

impl StatResult {
    /// Result of a rank test, which only reports a statistic and p-value.
    pub fn rank_test(cell_type: &str, term: &str, statistic: f64, p_value: f64) -> Self {
        Self {
            cell_type: cell_type.to_string(),
            term: term.to_string(),
            method: "mann_whitney_u".to_string(),
            sum_sq: None,
            df: None,
            statistic: Some(statistic),
            p_value,
            significance: Significance::from_pvalue(p_value),
        }
    }

    /// Result of one ANOVA term.
    pub fn anova_term(
        cell_type: &str,
        term: &str,
        sum_sq: f64,
        df: f64,
        f_statistic: f64,
        p_value: f64,
    ) -> Self {
        Self {
            cell_type: cell_type.to_string(),
            term: term.to_string(),
            method: "anova_type2".to_string(),
            sum_sq: Some(sum_sq),
            df: Some(df),
            statistic: Some(f_statistic),
            p_value,
            significance: Significance::from_pvalue(p_value),
        }
    }
}

/// Collection of comparison results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatResultSet {
    /// Individual results, grouped by cell type.
    pub results: Vec<StatResult>,
}

impl StatResultSet {
    /// Create a result set, dropping rows whose p-value is undefined.
    pub fn new(results: Vec<StatResult>) -> Self {
        Self {
            results: results.into_iter().filter(|r| !r.p_value.is_nan()).collect(),
        }
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results for a single term.
    pub fn for_term<'a>(&'a self, term: &'a str) -> impl Iterator<Item = &'a StatResult> + 'a {
        self.results.iter().filter(move |r| r.term == term)
    }

    /// Distinct terms, in first-appearance order.
    pub fn terms(&self) -> Vec<&str> {
        let mut terms: Vec<&str> = Vec::new();
        for r in &self.results {
            if !terms.contains(&r.term.as_str()) {
                terms.push(&r.term);
            }
        }
        terms
    }

    /// Get results sorted by p-value (ascending).
    pub fn sorted_by_pvalue(&self) -> Vec<&StatResult> {
        let mut sorted: Vec<_> = self.results.iter().collect();
        sorted.sort_by(|a, b| a.p_value.total_cmp(&b.p_value));
        sorted
    }

    /// Count results in each significance band.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            total: self.len(),
            significant_001: self.results.iter().filter(|r| r.p_value < 0.001).count(),
            significant_01: self.results.iter().filter(|r| r.p_value < 0.01).count(),
            significant_05: self.results.iter().filter(|r| r.p_value < 0.05).count(),
            significant_10: self.results.iter().filter(|r| r.p_value < 0.10).count(),
        }
    }

    /// Write results to TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "cell_type\tterm\tmethod\tsum_sq\tdf\tstatistic\tp_value\tsignificance"
        )?;

        let opt = |v: Option<f64>| v.map(|x| format!("{:.6}", x)).unwrap_or_default();
        for r in &self.results {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{:.4e}\t{}",
                r.cell_type,
                r.term,
                r.method,
                opt(r.sum_sq),
                opt(r.df),
                opt(r.statistic),
                r.p_value,
                r.significance.name()
            )?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Iterate over results.
    pub fn iter(&self) -> impl Iterator<Item = &StatResult> {
        self.results.iter()
    }
}

/// Counts of results below common p-value thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: usize,
    pub significant_001: usize,
    pub significant_01: usize,
    pub significant_05: usize,
    pub significant_10: usize,
}

impl std::fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total tests: {}", self.total)?;
        writeln!(f, "Significant at p < 0.001: {}", self.significant_001)?;
        writeln!(f, "Significant at p < 0.01:  {}", self.significant_01)?;
        writeln!(f, "Significant at p < 0.05:  {}", self.significant_05)?;
        writeln!(f, "Significant at p < 0.10:  {}", self.significant_10)?;
        Ok(())
    }
}
