//! Row selection: the analysis cohort and ad-hoc subsets.

pub mod cohort;
pub mod subset;

pub use cohort::{CohortFilter, Equality};
pub use subset::{grouped_counts, GroupCount, GroupedCounts, SubsetClause, SubsetQuery};
