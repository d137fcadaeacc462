//! Ad-hoc subsetting and grouped counts over a sample table.

use crate::data::{SampleRow, SampleTable, Value};
use crate::error::{CellCountError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// `column ∈ values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetClause {
    /// Column to test.
    pub column: String,
    /// Accepted literals.
    pub values: Vec<String>,
}

/// A conjunction of set-membership clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetQuery {
    /// Clauses, all of which must hold.
    pub clauses: Vec<SubsetClause>,
}

impl SubsetQuery {
    /// Query matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `column ∈ values` clause. An empty set matches nothing.
    pub fn with(mut self, column: &str, values: &[&str]) -> Self {
        self.clauses.push(SubsetClause {
            column: column.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    fn matches(&self, row: SampleRow<'_>) -> Result<bool> {
        for clause in &self.clauses {
            let value = row.require(&clause.column)?;
            if !clause.values.iter().any(|v| value.matches_literal(v)) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Rows of `table` satisfying every clause.
    pub fn apply(&self, table: &SampleTable) -> Result<SampleTable> {
        for clause in &self.clauses {
            table.schema().require(&clause.column)?;
        }
        table.try_filter(|row| self.matches(row))
    }
}

/// Non-missing counts of some columns within one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    /// Group key, one value per group column.
    pub key: Vec<Value>,
    /// One count per count column.
    pub counts: Vec<usize>,
}

/// Output of [`grouped_counts`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedCounts {
    /// Columns forming the group key.
    pub group_columns: Vec<String>,
    /// Columns whose non-missing values are counted.
    pub count_columns: Vec<String>,
    /// Groups sorted by key.
    pub groups: Vec<GroupCount>,
}

impl GroupedCounts {
    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Write the table to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header: Vec<&str> = self
            .group_columns
            .iter()
            .chain(&self.count_columns)
            .map(String::as_str)
            .collect();
        writeln!(writer, "{}", header.join("\t"))?;

        for group in &self.groups {
            let fields: Vec<String> = group
                .key
                .iter()
                .map(|v| v.to_string())
                .chain(group.counts.iter().map(|c| c.to_string()))
                .collect();
            writeln!(writer, "{}", fields.join("\t"))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Group `table` by `group_columns` and count non-missing values of each
/// of `count_columns` per group.
///
/// Rows with a missing value in any group column are skipped.
///
/// # Errors
/// * `InvalidParameter` if either column list is empty
/// * `OverlappingColumns` if a column is in both lists
/// * `UnknownColumn` if a column is absent
pub fn grouped_counts(
    table: &SampleTable,
    group_columns: &[String],
    count_columns: &[String],
) -> Result<GroupedCounts> {
    if group_columns.is_empty() || count_columns.is_empty() {
        return Err(CellCountError::InvalidParameter(
            "Grouped counts need at least one group column and one count column".to_string(),
        ));
    }
    let overlap: Vec<String> = group_columns
        .iter()
        .filter(|c| count_columns.contains(c))
        .cloned()
        .collect();
    if !overlap.is_empty() {
        return Err(CellCountError::OverlappingColumns(overlap));
    }

    let schema = table.schema();
    let group_idx = group_columns
        .iter()
        .map(|c| schema.require(c))
        .collect::<Result<Vec<_>>>()?;
    let count_idx = count_columns
        .iter()
        .map(|c| schema.require(c))
        .collect::<Result<Vec<_>>>()?;

    let mut groups: Vec<GroupCount> = Vec::new();
    for row in table.rows() {
        let key: Vec<Value> = group_idx.iter().map(|&i| row[i].clone()).collect();
        if key.iter().any(Value::is_missing) {
            continue;
        }
        let pos = match groups.iter().position(|g| g.key == key) {
            Some(pos) => pos,
            None => {
                groups.push(GroupCount {
                    key,
                    counts: vec![0; count_idx.len()],
                });
                groups.len() - 1
            }
        };
        for (slot, &i) in count_idx.iter().enumerate() {
            if !row[i].is_missing() {
                groups[pos].counts[slot] += 1;
            }
        }
    }
    groups.sort_by(|a, b| cmp_keys(&a.key, &b.key));

    Ok(GroupedCounts {
        group_columns: group_columns.to_vec(),
        count_columns: count_columns.to_vec(),
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
sample,project,sex,response,b_cell,nk_cell
s1,prj1,M,yes,10,5
s2,prj1,F,no,20,
s3,prj2,M,no,30,7
s4,prj2,M,,40,8
s5,prj1,M,yes,50,9
";

    fn table() -> SampleTable {
        SampleTable::from_csv_reader(CSV.as_bytes()).unwrap()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_subset_query() {
        let q = SubsetQuery::new().with("project", &["prj1"]).with("sex", &["M", "F"]);
        let subset = q.apply(&table()).unwrap();
        let ids: Vec<String> = subset.iter().filter_map(|r| r.sample_id()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s5"]);
    }

    #[test]
    fn test_empty_value_set_matches_nothing() {
        let q = SubsetQuery::new().with("project", &[]);
        assert!(q.apply(&table()).unwrap().is_empty());
        assert_eq!(SubsetQuery::new().apply(&table()).unwrap().n_rows(), 5);
    }

    #[test]
    fn test_grouped_counts() {
        let g = grouped_counts(&table(), &cols(&["project", "response"]), &cols(&["b_cell", "nk_cell"]))
            .unwrap();

        // s4 has no response and is skipped
        assert_eq!(g.len(), 3);
        assert_eq!(g.groups[0].key, vec![Value::Text("prj1".into()), Value::Text("no".into())]);
        assert_eq!(g.groups[0].counts, vec![1, 0]);
        assert_eq!(g.groups[1].key[1], Value::Text("yes".into()));
        assert_eq!(g.groups[1].counts, vec![2, 2]);
        assert_eq!(g.groups[2].counts, vec![1, 1]);
    }

    #[test]
    fn test_grouped_counts_overlap() {
        let result = grouped_counts(&table(), &cols(&["project", "b_cell"]), &cols(&["b_cell"]));
        assert!(matches!(
            result,
            Err(CellCountError::OverlappingColumns(c)) if c == vec!["b_cell".to_string()]
        ));
        assert!(grouped_counts(&table(), &[], &cols(&["b_cell"])).is_err());
        assert!(matches!(
            grouped_counts(&table(), &cols(&["site"]), &cols(&["b_cell"])),
            Err(CellCountError::UnknownColumn(_))
        ));
    }
}
