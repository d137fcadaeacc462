//! Pipeline composition and execution for the responder analysis.

mod runner;

pub use runner::{AnalysisConfig, Pipeline, PipelineContext, PipelineStep, DEFAULT_CELL_TYPES};
