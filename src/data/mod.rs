//! Sample tables, frequencies and model inputs.

mod design_matrix;
mod formula;
mod frequency;
mod result;
mod sample_table;
mod schema;
mod value;

pub use design_matrix::{DesignMatrix, FactorFrame};
pub use formula::{Formula, Term};
pub use frequency::{compute_frequencies, validate_cell_type_columns, FrequencyRecord, FrequencyTable};
pub use result::{ResultSummary, Significance, StatResult, StatResultSet};
pub use sample_table::{SampleRow, SampleTable};
pub use schema::{quote_identifier, ColumnSpec, Schema, SAMPLE_COLUMN};
pub use value::{is_missing_token, parse_timestamp, ColumnType, Value, TIMESTAMP_FORMAT};
