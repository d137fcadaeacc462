//! SQLite-backed sample store.

use crate::data::{
    quote_identifier, ColumnSpec, ColumnType, SampleTable, Schema, Value, SAMPLE_COLUMN,
    TIMESTAMP_FORMAT,
};
use crate::error::{CellCountError, Result};
use crate::store::{SampleStore, DEFAULT_TABLE};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::Path;
use tracing::{debug, info, warn};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Real(v) => ToSqlOutput::from(*v),
            Value::Boolean(b) => ToSqlOutput::from(*b),
            Value::Timestamp(ts) => ToSqlOutput::from(ts.format(TIMESTAMP_FORMAT).to_string()),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Missing => ToSqlOutput::Owned(rusqlite::types::Value::Null),
        })
    }
}

/// Sample rows in one SQLite table.
#[derive(Debug)]
pub struct SqliteSampleStore {
    conn: Connection,
    table: String,
}

impl SqliteSampleStore {
    /// Open (or create) a database file using the default table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(db = %path.display(), "opening sample store");
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// In-memory database using the default table.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Use a different table name.
    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the table has been created.
    pub fn exists(&self) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [&self.table],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// The declared schema, read back from the table definition.
    pub fn schema(&self) -> Result<Schema> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(&self.table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared: String = row.get(2)?;
                let not_null: i64 = row.get(3)?;
                Ok(ColumnSpec::new(
                    &name,
                    ColumnType::from_sql_name(&declared),
                    not_null == 0,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if columns.is_empty() {
            return Err(CellCountError::EmptyData(format!(
                "Table '{}' does not exist; initialise the store first",
                self.table
            )));
        }
        Schema::new(columns)
    }

    /// Replace the table with `rows`, declaring its schema from them.
    pub fn create(&mut self, rows: &SampleTable) -> Result<usize> {
        rows.schema().require(SAMPLE_COLUMN)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};\n{};",
            quote_identifier(&self.table),
            rows.schema().create_table_sql(&self.table)
        ))?;
        let n = insert_rows(&tx, &self.table, rows.schema(), rows)?;
        tx.commit()?;
        info!(table = %self.table, rows = n, columns = rows.schema().n_columns(), "table created");
        Ok(n)
    }

    /// Replace the table with the contents of a CSV file.
    pub fn create_from_csv<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let rows = SampleTable::from_csv(path)?;
        self.create(&rows)
    }

    /// Append a CSV file parsed against the stored schema.
    pub fn append_csv<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let schema = self.schema()?;
        let rows = SampleTable::from_csv_with_schema(path, &schema)?;
        self.append(&rows)
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(&self.table));
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl SampleStore for SqliteSampleStore {
    fn read_all(&self) -> Result<SampleTable> {
        let schema = self.schema()?;
        let names: Vec<String> = schema.columns().iter().map(|c| quote_identifier(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            names.join(", "),
            quote_identifier(&self.table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut query = stmt.query([])?;

        let mut rows = Vec::new();
        while let Some(row) = query.next()? {
            let mut values = Vec::with_capacity(schema.n_columns());
            for (idx, spec) in schema.columns().iter().enumerate() {
                values.push(read_value(row.get_ref(idx)?, spec, rows.len())?);
            }
            rows.push(values);
        }
        debug!(table = %self.table, rows = rows.len(), "read all rows");
        SampleTable::new(schema, rows)
    }

    fn append(&mut self, rows: &SampleTable) -> Result<usize> {
        let schema = self.schema()?;
        let order = schema.match_header(&rows.column_names())?;
        let reordered: Vec<Vec<Value>> = rows
            .rows()
            .iter()
            .map(|r| order.iter().map(|&i| r[i].clone()).collect())
            .collect();
        for (idx, row) in reordered.iter().enumerate() {
            schema.check_row(row, idx)?;
        }
        let batch = SampleTable::new(schema.clone(), reordered)?;

        let tx = self.conn.transaction()?;
        let n = insert_rows(&tx, &self.table, &schema, &batch)?;
        tx.commit()?;
        info!(table = %self.table, rows = n, "rows appended");
        Ok(n)
    }

    fn delete_by_sample_id(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.schema()?.require(SAMPLE_COLUMN)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_identifier(&self.table),
            quote_identifier(SAMPLE_COLUMN)
        );
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for id in ids {
                removed += stmt.execute([id])?;
            }
        }
        tx.commit()?;
        if removed == 0 {
            warn!(table = %self.table, ids = ?ids, "no rows matched the sample ids");
        } else {
            info!(table = %self.table, rows = removed, "rows deleted");
        }
        Ok(removed)
    }

    fn list_columns(&self) -> Result<Vec<String>> {
        Ok(self.schema()?.column_names())
    }
}

fn insert_rows(conn: &Connection, table: &str, schema: &Schema, rows: &SampleTable) -> Result<usize> {
    let names: Vec<String> = schema.columns().iter().map(|c| quote_identifier(&c.name)).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        names.join(", "),
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    for row in rows.rows() {
        stmt.execute(params_from_iter(row.iter()))?;
    }
    Ok(rows.n_rows())
}

fn read_value(raw: ValueRef<'_>, spec: &ColumnSpec, row: usize) -> Result<Value> {
    let invalid = |shown: String| CellCountError::InvalidValue {
        value: shown,
        column: spec.name.clone(),
        row,
    };
    Ok(match (raw, spec.column_type) {
        (ValueRef::Null, _) => Value::Missing,
        (ValueRef::Integer(v), ColumnType::Integer) => Value::Integer(v),
        (ValueRef::Integer(v), ColumnType::Real) => Value::Real(v as f64),
        (ValueRef::Integer(v), ColumnType::Boolean) => Value::Boolean(v != 0),
        (ValueRef::Integer(v), ColumnType::Text) => Value::Text(v.to_string()),
        (ValueRef::Real(v), ColumnType::Real) => Value::Real(v),
        (ValueRef::Real(v), ColumnType::Integer) if v.fract() == 0.0 => Value::Integer(v as i64),
        (ValueRef::Real(v), ColumnType::Text) => Value::Text(v.to_string()),
        (ValueRef::Text(bytes), ty) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| invalid(String::from_utf8_lossy(bytes).into_owned()))?;
            ty.parse(text, &spec.name, row)?
        }
        (other, _) => return Err(invalid(format!("{:?}", other))),
    })
}
