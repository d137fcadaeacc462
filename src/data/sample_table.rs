//! Wide-format table of per-sample cell counts and metadata.

use crate::data::schema::{Schema, SAMPLE_COLUMN};
use crate::data::value::Value;
use crate::error::{CellCountError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A borrowed view of one raw sample row.
#[derive(Debug, Clone, Copy)]
pub struct SampleRow<'a> {
    schema: &'a Schema,
    values: &'a [Value],
}

impl<'a> SampleRow<'a> {
    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.schema.index_of(column).map(|idx| &self.values[idx])
    }

    /// Get a value by column name, failing with `UnknownColumn`.
    pub fn require(&self, column: &str) -> Result<&'a Value> {
        self.get(column)
            .ok_or_else(|| CellCountError::UnknownColumn(column.to_string()))
    }

    /// The sample identifier as a label. `None` if missing.
    pub fn sample_id(&self) -> Option<String> {
        self.get(SAMPLE_COLUMN).and_then(Value::label)
    }

    /// All values in schema order.
    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

/// Raw sample rows sharing one declared schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    schema: Schema,
    rows: Vec<Vec<Value>>,
}

impl SampleTable {
    /// Create a table, validating every row against the schema.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            schema.check_row(row, idx)?;
        }
        Ok(Self { schema, rows })
    }

    /// Create an empty table with the given schema.
    pub fn empty(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Load a CSV file, inferring the schema from its contents.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_csv_reader(File::open(path)?)
    }

    /// Load CSV data from any reader, inferring the schema.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let (header, records) = read_records(reader)?;
        if records.is_empty() {
            return Err(CellCountError::EmptyData("No rows in CSV input".to_string()));
        }
        let schema = Schema::infer(&header, &records)?;
        let order: Vec<usize> = (0..header.len()).collect();
        Self::parse_records(schema, &order, &records)
    }

    /// Load a CSV file against a declared schema.
    ///
    /// Column order may differ from the schema; names, types and nullability
    /// must match or the load fails with `SchemaMismatch`.
    pub fn from_csv_with_schema<P: AsRef<Path>>(path: P, schema: &Schema) -> Result<Self> {
        Self::from_csv_reader_with_schema(File::open(path)?, schema)
    }

    /// Load CSV data from any reader against a declared schema.
    pub fn from_csv_reader_with_schema<R: Read>(reader: R, schema: &Schema) -> Result<Self> {
        let (header, records) = read_records(reader)?;
        let order = schema.match_header(&header)?;
        Self::parse_records(schema.clone(), &order, &records).map_err(|e| match e {
            CellCountError::InvalidValue { value, column, row } => {
                CellCountError::SchemaMismatch(format!(
                    "Value '{}' at row {} does not parse as column '{}'",
                    value, row, column
                ))
            }
            other => other,
        })
    }

    fn parse_records(schema: Schema, order: &[usize], records: &[Vec<String>]) -> Result<Self> {
        let mut rows = Vec::with_capacity(records.len());
        for (row_idx, record) in records.iter().enumerate() {
            let mut values = Vec::with_capacity(schema.n_columns());
            for (spec, &src) in schema.columns().iter().zip(order) {
                let raw = record.get(src).map(String::as_str).unwrap_or("");
                values.push(spec.column_type.parse(raw, &spec.name, row_idx)?);
            }
            rows.push(values);
        }
        Self::new(schema, rows)
    }

    /// The declared schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema.column_names()
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get a row view.
    pub fn row(&self, idx: usize) -> Option<SampleRow<'_>> {
        self.rows.get(idx).map(|values| SampleRow {
            schema: &self.schema,
            values,
        })
    }

    /// Iterate over row views.
    pub fn iter(&self) -> impl Iterator<Item = SampleRow<'_>> + '_ {
        self.rows.iter().map(move |values| SampleRow {
            schema: &self.schema,
            values,
        })
    }

    /// Raw row values in schema order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// All values of one column.
    pub fn column(&self, column: &str) -> Result<Vec<&Value>> {
        let idx = self.schema.require(column)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Distinct non-missing values of a column, in order of first appearance.
    pub fn unique_values(&self, column: &str) -> Result<Vec<Value>> {
        let mut unique: Vec<Value> = Vec::new();
        for value in self.column(column)? {
            if !value.is_missing() && !unique.contains(value) {
                unique.push(value.clone());
            }
        }
        Ok(unique)
    }

    /// Table without the given columns. Every name must exist.
    pub fn drop_columns(&self, columns: &[String]) -> Result<Self> {
        for col in columns {
            self.schema.require(col)?;
        }
        let keep: Vec<usize> = self
            .schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| !columns.contains(&c.name))
            .map(|(i, _)| i)
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|r| keep.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Ok(Self {
            schema: self.schema.without(columns)?,
            rows,
        })
    }

    /// Keep only rows satisfying a fallible predicate.
    pub fn try_filter<F>(&self, mut keep: F) -> Result<Self>
    where
        F: FnMut(SampleRow<'_>) -> Result<bool>,
    {
        let mut rows = Vec::new();
        for (idx, values) in self.rows.iter().enumerate() {
            let row = SampleRow {
                schema: &self.schema,
                values,
            };
            if keep(row)? {
                rows.push(self.rows[idx].clone());
            }
        }
        Ok(Self {
            schema: self.schema.clone(),
            rows,
        })
    }
}

fn read_records<R: Read>(reader: R) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);
    let header: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if header.is_empty() || header.iter().all(String::is_empty) {
        return Err(CellCountError::EmptyData("CSV input has no header".to_string()));
    }
    let mut records = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok((header, records))
}
