//! Immune Cell-Count Analysis Library
//!
//! This library turns per-sample immune cell-population counts into relative
//! frequencies and compares responders with non-responders within a study
//! cohort.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Sample tables with a declared schema, frequencies, formulas, results
//! - **filter**: Cohort predicates, ad-hoc subsets and grouped counts
//! - **model**: Ordinary least squares
//! - **test**: Rank-sum test and Type II ANOVA
//! - **compare**: Joining frequencies to metadata and running a test strategy
//! - **present**: P-value lookup and box-plot grid data
//! - **store**: SQLite-backed sample store
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use cellcount_analysis::prelude::*;
//!
//! let store = SqliteSampleStore::open("data/cell_counts.db").unwrap();
//! let samples = store.read_all().unwrap();
//!
//! let context = Pipeline::full(AnalysisConfig::default())
//!     .run(samples)
//!     .unwrap();
//! let pvalues = cell_type_pvalues(context.results().unwrap(), "response").unwrap();
//! ```

pub mod compare;
pub mod data;
pub mod error;
pub mod filter;
pub mod model;
pub mod pipeline;
pub mod present;
pub mod store;
pub mod test;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::compare::{
        compare_analysis, compare_groups, join_frequencies, AnalysisRecord, AnalysisSet,
        ResponseGroups, StatStrategy,
    };
    pub use crate::data::{
        compute_frequencies, ColumnSpec, ColumnType, FrequencyRecord, FrequencyTable, SampleTable,
        Schema, Significance, StatResult, StatResultSet, Value,
    };
    pub use crate::error::{CellCountError, Result};
    pub use crate::filter::{grouped_counts, CohortFilter, GroupedCounts, SubsetQuery};
    pub use crate::pipeline::{AnalysisConfig, Pipeline, PipelineContext, PipelineStep};
    pub use crate::present::{build_panel_grid, cell_type_pvalues, format_pvalue, PanelGrid};
    pub use crate::store::{SampleStore, SqliteSampleStore};
    pub use crate::test::{anova_type2, mann_whitney_u, AnovaTable, RankSumResult};
}
