//! Group comparison: frequencies joined to metadata, restricted to a
//! cohort, and tested per cell type.

pub mod join;
pub mod strategy;

pub use join::{join_frequencies, AnalysisRecord, AnalysisSet};
pub use strategy::{
    compare_analysis, compare_groups, ResponseGroups, StatStrategy, DEFAULT_ANOVA_FORMULA,
};
