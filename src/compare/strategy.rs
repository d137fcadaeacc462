//! Test strategies comparing response groups within each cell type.

use crate::compare::join::{join_frequencies, AnalysisSet};
use crate::data::{
    FactorFrame, Formula, FrequencyTable, SampleTable, StatResult, StatResultSet, Value,
};
use crate::error::{CellCountError, Result};
use crate::filter::CohortFilter;
use crate::test::{anova_type2, mann_whitney_u};
use serde::{Deserialize, Serialize};

/// Default two-factor model: response, time point and their interaction.
pub const DEFAULT_ANOVA_FORMULA: &str = "~ response * time_from_treatment_start";

/// The binary response label used to split a cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseGroups {
    /// Metadata column holding the label.
    pub column: String,
    /// Label of responders.
    pub responder: String,
    /// Label of non-responders.
    pub non_responder: String,
}

impl Default for ResponseGroups {
    fn default() -> Self {
        Self {
            column: "response".to_string(),
            responder: "yes".to_string(),
            non_responder: "no".to_string(),
        }
    }
}

/// How each cell type's frequencies are compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatStrategy {
    /// Mann-Whitney U between responders and non-responders.
    RankTest {
        #[serde(default)]
        groups: ResponseGroups,
    },
    /// Type II ANOVA of relative frequency on categorical factors.
    AnovaTest { formula: String },
}

impl Default for StatStrategy {
    fn default() -> Self {
        Self::anova(DEFAULT_ANOVA_FORMULA)
    }
}

impl StatStrategy {
    /// Rank test on the default `response` yes/no labels.
    pub fn rank_test() -> Self {
        Self::RankTest {
            groups: ResponseGroups::default(),
        }
    }

    /// ANOVA over the given formula.
    pub fn anova(formula: &str) -> Self {
        Self::AnovaTest {
            formula: formula.to_string(),
        }
    }

    /// Short name for logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RankTest { .. } => "rank_test",
            Self::AnovaTest { .. } => "anova_test",
        }
    }
}

/// Join, restrict to the cohort and test every cell type.
///
/// This is [`join_frequencies`] followed by [`compare_analysis`].
pub fn compare_groups(
    frequencies: &FrequencyTable,
    metadata: &SampleTable,
    cell_type_columns: &[String],
    cohort: &CohortFilter,
    strategy: &StatStrategy,
) -> Result<StatResultSet> {
    let analysis = join_frequencies(frequencies, metadata, cell_type_columns, cohort)?;
    compare_analysis(&analysis, strategy)
}

/// Test every cell type of an already-joined cohort.
///
/// Rows without a defined p-value are dropped from the result.
pub fn compare_analysis(analysis: &AnalysisSet, strategy: &StatStrategy) -> Result<StatResultSet> {
    if analysis.is_empty() {
        return Err(CellCountError::InsufficientData(
            "No records to compare".to_string(),
        ));
    }
    let results = match strategy {
        StatStrategy::RankTest { groups } => rank_test(analysis, groups)?,
        StatStrategy::AnovaTest { formula } => anova_test(analysis, &Formula::parse(formula)?)?,
    };
    Ok(StatResultSet::new(results))
}

fn rank_test(analysis: &AnalysisSet, groups: &ResponseGroups) -> Result<Vec<StatResult>> {
    analysis.require_column(&groups.column)?;

    let mut results = Vec::with_capacity(analysis.cell_types.len());
    for cell_type in &analysis.cell_types {
        let mut responders = Vec::new();
        let mut non_responders = Vec::new();
        for record in analysis.for_cell_type(cell_type) {
            match record.get(&groups.column) {
                Some(v) if v.matches_literal(&groups.responder) => {
                    responders.push(record.relative_frequency)
                }
                Some(v) if v.matches_literal(&groups.non_responder) => {
                    non_responders.push(record.relative_frequency)
                }
                _ => {}
            }
        }
        if responders.is_empty() || non_responders.is_empty() {
            return Err(CellCountError::InsufficientData(format!(
                "{}: {} '{}' and {} '{}' samples",
                cell_type,
                responders.len(),
                groups.responder,
                non_responders.len(),
                groups.non_responder
            )));
        }
        let test = mann_whitney_u(&responders, &non_responders)?;
        results.push(StatResult::rank_test(
            cell_type,
            &groups.column,
            test.u_statistic,
            test.p_value,
        ));
    }
    Ok(results)
}

fn anova_test(analysis: &AnalysisSet, formula: &Formula) -> Result<Vec<StatResult>> {
    let factors: Vec<String> = formula.variables().iter().map(|v| v.to_string()).collect();
    for factor in &factors {
        analysis.require_column(factor)?;
    }

    let mut results = Vec::new();
    for cell_type in &analysis.cell_types {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for record in analysis.for_cell_type(cell_type) {
            let levels: Option<Vec<String>> = factors
                .iter()
                .map(|f| record.get(f).and_then(Value::label))
                .collect();
            if let Some(levels) = levels {
                rows.push(levels);
                y.push(record.relative_frequency);
            }
        }

        let frame = FactorFrame::new(factors.clone(), rows)?;
        let table = anova_type2(&frame, &y, formula).map_err(|e| match e {
            CellCountError::ModelFit(msg) => {
                CellCountError::ModelFit(format!("{}: {}", cell_type, msg))
            }
            other => other,
        })?;
        for row in table.rows {
            results.push(StatResult::anova_term(
                cell_type,
                &row.term,
                row.sum_sq,
                row.df,
                row.f_statistic,
                row.p_value,
            ));
        }
    }
    Ok(results)
}
