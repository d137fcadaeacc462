//! Persistent storage of raw sample rows.

mod sqlite;

pub use sqlite::SqliteSampleStore;

use crate::data::SampleTable;
use crate::error::Result;

/// Default table holding the sample rows.
pub const DEFAULT_TABLE: &str = "cell_counts";

/// A relational table of raw sample rows.
///
/// Each call is a complete operation; batches are applied in full or not at all.
pub trait SampleStore {
    /// Every stored row, in insertion order.
    fn read_all(&self) -> Result<SampleTable>;

    /// Append rows that match the store's declared schema. Returns the
    /// number of rows added.
    fn append(&mut self, rows: &SampleTable) -> Result<usize>;

    /// Delete every row whose sample identifier is in `ids`. Returns the
    /// number of rows removed; 0 for an empty list.
    fn delete_by_sample_id(&mut self, ids: &[String]) -> Result<usize>;

    /// Column names in schema order.
    fn list_columns(&self) -> Result<Vec<String>>;
}
