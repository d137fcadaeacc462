//! Hypothesis tests comparing cell-type frequencies between groups.

pub mod rank_sum;

pub use anova::{anova_type2, AnovaRow, AnovaTable};
pub use rank_sum::{mann_whitney_u, RankSumResult};
