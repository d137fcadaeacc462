//! Statistical models for comparing cell-type frequencies.

pub mod lm;

pub use lm::{fit_ols, LmFit};
