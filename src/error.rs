//! Error types for the cellcount-analysis library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum CellCountError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Sample '{sample}' has a total count of zero")]
    DivisionByZero { sample: String },

    #[error("Missing value for sample '{sample}' in column '{column}'")]
    MissingValue { sample: String, column: String },

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        value: String,
        column: String,
        row: usize,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model fit error: {0}")]
    ModelFit(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("More than one result for cell type '{cell_type}' and term '{term}'")]
    AmbiguousTerm { cell_type: String, term: String },

    #[error("Cannot group by columns that are also counted: {0:?}")]
    OverlappingColumns(Vec<String>),

    #[error("Formula parse error: {0}")]
    FormulaParse(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, CellCountError>;
