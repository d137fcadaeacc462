//! Pipeline runner: frequencies, group comparison and plot data as explicit
//! steps over one sample table.

use crate::compare::{compare_analysis, join_frequencies, AnalysisSet, StatStrategy};
use crate::data::{compute_frequencies, FrequencyTable, SampleTable, StatResultSet, SAMPLE_COLUMN};
use crate::error::{CellCountError, Result};
use crate::filter::CohortFilter;
use crate::present::{build_panel_grid, PanelGrid};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cell-type count columns of the standard panel.
pub const DEFAULT_CELL_TYPES: [&str; 5] = ["b_cell", "cd8_t_cell", "cd4_t_cell", "nk_cell", "monocyte"];

/// A step in the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Relative frequencies of every cell type per sample.
    Frequencies,
    /// Join to metadata, restrict to the cohort and run the test strategy.
    Statistics,
    /// Box-plot grid annotated with p-values.
    Plot,
}

/// Analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Name of the analysis.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Count columns to turn into frequencies.
    pub cell_type_columns: Vec<String>,
    /// Samples included in the comparison.
    pub cohort: CohortFilter,
    /// Test run per cell type.
    pub strategy: StatStrategy,
    /// Term whose p-values annotate the plot panels.
    pub plot_term: String,
    /// Metadata column splitting each panel into boxes.
    pub response_column: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            name: "responder_comparison".to_string(),
            description: None,
            cell_type_columns: DEFAULT_CELL_TYPES.iter().map(|s| s.to_string()).collect(),
            cohort: CohortFilter::default(),
            strategy: StatStrategy::default(),
            plot_term: "response".to_string(),
            response_column: "response".to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(CellCountError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Replace the cell-type columns, dropping the sample identifier if listed.
    pub fn with_cell_types(mut self, columns: &[String]) -> Self {
        self.cell_type_columns = columns
            .iter()
            .filter(|c| c.as_str() != SAMPLE_COLUMN)
            .cloned()
            .collect();
        self
    }

    /// Check settings that do not depend on data.
    pub fn validate(&self) -> Result<()> {
        if self.cell_type_columns.is_empty() {
            return Err(CellCountError::InvalidParameter(
                "cell_type_columns must not be empty".to_string(),
            ));
        }
        if self.cell_type_columns.iter().any(|c| c == SAMPLE_COLUMN) {
            return Err(CellCountError::InvalidParameter(format!(
                "cell_type_columns must not contain '{}'",
                SAMPLE_COLUMN
            )));
        }
        if let StatStrategy::AnovaTest { formula } = &self.strategy {
            crate::data::Formula::parse(formula)?;
        }
        Ok(())
    }
}

/// Builder for an analysis run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: AnalysisConfig,
    steps: Vec<PipelineStep>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            steps: Vec::new(),
        }
    }

    /// Pipeline running every step in order.
    pub fn full(config: AnalysisConfig) -> Self {
        Self::new(config).frequencies().statistics().plot()
    }

    /// The configuration.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Steps to run, in order.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Add the frequency step.
    pub fn frequencies(mut self) -> Self {
        self.steps.push(PipelineStep::Frequencies);
        self
    }

    /// Add the statistics step.
    pub fn statistics(mut self) -> Self {
        self.steps.push(PipelineStep::Statistics);
        self
    }

    /// Add the plot step.
    pub fn plot(mut self) -> Self {
        self.steps.push(PipelineStep::Plot);
        self
    }

    /// Run the steps on a sample table.
    ///
    /// A failing step returns its own error unchanged; `Pipeline` errors only
    /// report steps requested out of order.
    pub fn run(&self, samples: SampleTable) -> Result<PipelineContext> {
        self.config.validate()?;
        let mut context = PipelineContext::new(samples);
        for step in &self.steps {
            context.apply(*step, &self.config)?;
        }
        Ok(context)
    }
}

/// Intermediate results of one run, held explicitly rather than between calls.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    samples: SampleTable,
    frequencies: Option<FrequencyTable>,
    analysis: Option<AnalysisSet>,
    results: Option<StatResultSet>,
    plot: Option<PanelGrid>,
}

impl PipelineContext {
    /// Start from a sample table.
    pub fn new(samples: SampleTable) -> Self {
        Self {
            samples,
            frequencies: None,
            analysis: None,
            results: None,
            plot: None,
        }
    }

    /// Run one step. Later steps need the outputs of earlier ones.
    pub fn apply(&mut self, step: PipelineStep, config: &AnalysisConfig) -> Result<()> {
        match step {
            PipelineStep::Frequencies => {
                self.frequencies = Some(compute_frequencies(
                    &self.samples,
                    &config.cell_type_columns,
                )?);
                self.analysis = None;
                self.results = None;
                self.plot = None;
            }
            PipelineStep::Statistics => {
                let frequencies = self.frequencies()?;
                let analysis = join_frequencies(
                    frequencies,
                    &self.samples,
                    &config.cell_type_columns,
                    &config.cohort,
                )?;
                let results = compare_analysis(&analysis, &config.strategy)?;
                self.analysis = Some(analysis);
                self.results = Some(results);
                self.plot = None;
            }
            PipelineStep::Plot => {
                let analysis = self.analysis()?;
                let results = self.results()?;
                let grid = build_panel_grid(
                    analysis,
                    results,
                    &config.plot_term,
                    &config.response_column,
                )?;
                self.plot = Some(grid);
            }
        }
        Ok(())
    }

    /// The sample table the run started from.
    pub fn samples(&self) -> &SampleTable {
        &self.samples
    }

    /// Frequencies. Fails if the frequency step has not run.
    pub fn frequencies(&self) -> Result<&FrequencyTable> {
        self.frequencies.as_ref().ok_or_else(|| {
            CellCountError::Pipeline("Compute frequencies before running statistics".to_string())
        })
    }

    /// Cohort records. Fails if the statistics step has not run.
    pub fn analysis(&self) -> Result<&AnalysisSet> {
        self.analysis.as_ref().ok_or_else(|| {
            CellCountError::Pipeline("Run statistics before plotting".to_string())
        })
    }

    /// Test results. Fails if the statistics step has not run.
    pub fn results(&self) -> Result<&StatResultSet> {
        self.results.as_ref().ok_or_else(|| {
            CellCountError::Pipeline("Run statistics before plotting".to_string())
        })
    }

    /// Plot data. Fails if the plot step has not run.
    pub fn plot(&self) -> Result<&PanelGrid> {
        self.plot
            .as_ref()
            .ok_or_else(|| CellCountError::Pipeline("Plot has not been built".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
project,subject,condition,age,sex,treatment,response,sample,sample_type,time_from_treatment_start,b_cell,cd8_t_cell,cd4_t_cell,nk_cell,monocyte
prj1,sbj1,melanoma,57,M,miraclib,yes,s1,PBMC,0,10,20,30,25,15
prj1,sbj1,melanoma,57,M,miraclib,yes,s2,PBMC,7,12,18,31,22,17
prj1,sbj2,melanoma,61,F,miraclib,yes,s3,PBMC,0,14,16,28,24,18
prj1,sbj2,melanoma,61,F,miraclib,yes,s4,PBMC,7,17,14,30,21,18
prj1,sbj3,melanoma,45,F,miraclib,no,s5,PBMC,0,30,10,20,26,14
prj1,sbj3,melanoma,45,F,miraclib,no,s6,PBMC,7,33,9,18,23,17
prj1,sbj4,melanoma,70,M,miraclib,no,s7,PBMC,0,28,12,21,22,17
prj1,sbj4,melanoma,70,M,miraclib,no,s8,PBMC,7,31,11,19,25,14
prj2,sbj5,carcinoma,52,M,phauximab,yes,s9,WB,0,50,10,10,20,10
";

    fn samples() -> SampleTable {
        SampleTable::from_csv_reader(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_config_yaml_roundtrip_defaults() {
        let yaml = AnalysisConfig::default().to_yaml().unwrap();
        let config = AnalysisConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config, AnalysisConfig::default());

        let partial = AnalysisConfig::from_yaml("name: rank\nstrategy:\n  kind: rank_test\n").unwrap();
        assert_eq!(partial.strategy, StatStrategy::rank_test());
        assert_eq!(partial.cell_type_columns.len(), 5);
    }

    #[test]
    fn test_config_rejects_sample_column() {
        let yaml = "cell_type_columns: [b_cell, sample]\n";
        assert!(AnalysisConfig::from_yaml(yaml).is_err());

        let config = AnalysisConfig::default()
            .with_cell_types(&["b_cell".to_string(), "sample".to_string()]);
        assert_eq!(config.cell_type_columns, vec!["b_cell"]);
        // the caller's list is untouched, so repeating the call is harmless
        let again = config.clone().with_cell_types(&config.cell_type_columns);
        assert_eq!(again.cell_type_columns, vec!["b_cell"]);
    }

    #[test]
    fn test_full_pipeline() {
        let context = Pipeline::full(AnalysisConfig::default()).run(samples()).unwrap();

        assert_eq!(context.frequencies().unwrap().len(), 9 * 5);
        let analysis = context.analysis().unwrap();
        assert!(analysis.records.iter().all(|r| r.sample != "s9"));

        let results = context.results().unwrap();
        assert_eq!(results.len(), 5 * 3);
        assert_eq!(results.for_term("response").count(), 5);

        let plot = context.plot().unwrap();
        assert_eq!(plot.panels.len(), 5);
        assert_eq!(plot.nrows, 2);
    }

    #[test]
    fn test_steps_out_of_order() {
        let result = Pipeline::default().statistics().run(samples());
        assert!(matches!(result, Err(CellCountError::Pipeline(msg)) if msg.contains("frequencies")));

        let result = Pipeline::default().frequencies().plot().run(samples());
        assert!(matches!(result, Err(CellCountError::Pipeline(_))));
    }

    #[test]
    fn test_step_errors_keep_their_kind() {
        let zero = CSV.replace("s1,PBMC,0,10,20,30,25,15", "s1,PBMC,0,0,0,0,0,0");
        let zero_samples = SampleTable::from_csv_reader(zero.as_bytes()).unwrap();
        let err = Pipeline::new(AnalysisConfig::default())
            .frequencies()
            .run(zero_samples)
            .unwrap_err();
        assert!(matches!(err, CellCountError::DivisionByZero { ref sample } if sample == "s1"));

        let config = AnalysisConfig {
            cohort: CohortFilter::all().require("condition", "glioma"),
            ..AnalysisConfig::default()
        };
        let err = Pipeline::new(config).frequencies().statistics().run(samples()).unwrap_err();
        assert!(matches!(err, CellCountError::InsufficientData(_)));
    }

    #[test]
    fn test_rank_strategy_pipeline() {
        let config = AnalysisConfig {
            strategy: StatStrategy::rank_test(),
            ..AnalysisConfig::default()
        };
        let context = Pipeline::full(config).run(samples()).unwrap();
        let results = context.results().unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.term == "response"));
    }
}
