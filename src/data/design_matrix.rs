//! Treatment-coded design matrices for categorical factors.

use crate::data::{Formula, Term};
use crate::error::{CellCountError, Result};
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::ops::Range;

/// Observations of categorical factors, one level label per factor per row.
#[derive(Debug, Clone)]
pub struct FactorFrame {
    names: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl FactorFrame {
    /// Create a frame. Every row must have one level per factor.
    pub fn new(names: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(CellCountError::InvalidParameter(format!(
                    "Row {} has {} levels for {} factors",
                    idx,
                    row.len(),
                    names.len()
                )));
            }
        }
        Ok(Self { names, rows })
    }

    /// Factor names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of observations.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    fn index_of(&self, factor: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == factor)
            .ok_or_else(|| CellCountError::UnknownColumn(factor.to_string()))
    }

    /// Levels observed for a factor, sorted.
    ///
    /// Levels sort numerically when every one parses as a number, so time
    /// points order as 0, 7, 14 rather than 0, 14, 7.
    pub fn levels(&self, factor: &str) -> Result<Vec<String>> {
        let idx = self.index_of(factor)?;
        let mut levels: Vec<String> = Vec::new();
        for row in &self.rows {
            if !levels.contains(&row[idx]) {
                levels.push(row[idx].clone());
            }
        }
        let numeric: Option<Vec<f64>> = levels.iter().map(|l| l.parse::<f64>().ok()).collect();
        match numeric {
            Some(keys) => {
                let mut paired: Vec<(f64, String)> = keys.into_iter().zip(levels).collect();
                paired.sort_by(|a, b| a.0.total_cmp(&b.0));
                Ok(paired.into_iter().map(|(_, l)| l).collect())
            }
            None => {
                levels.sort();
                Ok(levels)
            }
        }
    }

    /// Level of a factor in every row.
    fn column(&self, factor: &str) -> Result<Vec<&str>> {
        let idx = self.index_of(factor)?;
        Ok(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }
}

/// A design matrix for linear modeling.
///
/// Column 0 is the intercept. Each factor is dummy coded against its first
/// level; interaction columns are products of the factors' dummy columns.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// The design matrix (observations × coefficients).
    matrix: DMatrix<f64>,
    /// Names of the coefficients (columns).
    coefficient_names: Vec<String>,
    /// Columns belonging to each term.
    term_columns: Vec<(Term, Range<usize>)>,
    /// Reference levels for each factor.
    reference_levels: HashMap<String, String>,
}

impl DesignMatrix {
    /// Build a design matrix from a factor frame and formula.
    pub fn from_formula(frame: &FactorFrame, formula: &Formula) -> Result<Self> {
        let n = frame.n_rows();

        let mut reference_levels = HashMap::new();
        let mut dummies: HashMap<&str, Vec<(String, Vec<f64>)>> = HashMap::new();
        for var in formula.variables() {
            let levels = frame.levels(var)?;
            let values = frame.column(var)?;
            if let Some(reference) = levels.first() {
                reference_levels.insert(var.to_string(), reference.clone());
            }
            let cols = levels
                .iter()
                .skip(1)
                .map(|level| {
                    let col = values
                        .iter()
                        .map(|v| if v == level { 1.0 } else { 0.0 })
                        .collect();
                    (format!("{}[{}]", var, level), col)
                })
                .collect();
            dummies.insert(var, cols);
        }

        let mut coefficient_names = vec!["(Intercept)".to_string()];
        let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];
        let mut term_columns = Vec::with_capacity(formula.terms.len());

        for term in &formula.terms {
            let start = columns.len();
            match term {
                Term::Main(var) => {
                    for (name, col) in &dummies[var.as_str()] {
                        coefficient_names.push(name.clone());
                        columns.push(col.clone());
                    }
                }
                Term::Interaction(var1, var2) => {
                    for (name1, col1) in &dummies[var1.as_str()] {
                        for (name2, col2) in &dummies[var2.as_str()] {
                            coefficient_names.push(format!("{}:{}", name1, name2));
                            columns.push(col1.iter().zip(col2).map(|(a, b)| a * b).collect());
                        }
                    }
                }
            }
            term_columns.push((term.clone(), start..columns.len()));
        }

        let matrix = DMatrix::from_fn(n, columns.len(), |row, col| columns[col][row]);

        Ok(Self {
            matrix,
            coefficient_names,
            term_columns,
            reference_levels,
        })
    }

    /// Sub-design with the intercept and only the given terms' columns.
    pub fn select_terms(&self, terms: &[Term]) -> Result<DMatrix<f64>> {
        let mut indices = vec![0usize];
        for term in terms {
            let range = self.columns_for(term).ok_or_else(|| {
                CellCountError::InvalidParameter(format!("Term '{}' not in design", term))
            })?;
            indices.extend(range);
        }
        Ok(self.matrix.select_columns(indices.iter()))
    }

    /// Column range of a term.
    pub fn columns_for(&self, term: &Term) -> Option<Range<usize>> {
        self.term_columns
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, r)| r.clone())
    }

    /// Get the design matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Get coefficient names.
    pub fn coefficient_names(&self) -> &[String] {
        &self.coefficient_names
    }

    /// Number of observations (rows).
    pub fn n_observations(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of coefficients (columns).
    pub fn n_coefficients(&self) -> usize {
        self.matrix.ncols()
    }

    /// Get the reference level for a factor.
    pub fn reference_level(&self, factor: &str) -> Option<&str> {
        self.reference_levels.get(factor).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FactorFrame {
        let rows = [
            ("yes", "0"),
            ("no", "0"),
            ("yes", "14"),
            ("no", "7"),
            ("yes", "7"),
            ("no", "14"),
        ]
        .iter()
        .map(|(r, t)| vec![r.to_string(), t.to_string()])
        .collect();
        FactorFrame::new(vec!["response".into(), "time".into()], rows).unwrap()
    }

    #[test]
    fn test_levels_numeric_order() {
        let f = frame();
        assert_eq!(f.levels("time").unwrap(), vec!["0", "7", "14"]);
        assert_eq!(f.levels("response").unwrap(), vec!["no", "yes"]);
        assert!(f.levels("sex").is_err());
    }

    #[test]
    fn test_main_effect_columns() {
        let f = frame();
        let formula = Formula::parse("~ response").unwrap();
        let dm = DesignMatrix::from_formula(&f, &formula).unwrap();

        assert_eq!(dm.coefficient_names(), &["(Intercept)", "response[yes]"]);
        assert_eq!(dm.reference_level("response"), Some("no"));
        let col: Vec<f64> = (0..6).map(|i| dm.matrix()[(i, 1)]).collect();
        assert_eq!(col, vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_factorial_columns() {
        let f = frame();
        let dm = DesignMatrix::from_formula(&f, &Formula::factorial("response", "time")).unwrap();

        // intercept + 1 response + 2 time + 2 interaction
        assert_eq!(dm.n_coefficients(), 6);
        assert_eq!(dm.n_observations(), 6);
        assert_eq!(
            dm.coefficient_names(),
            &[
                "(Intercept)",
                "response[yes]",
                "time[7]",
                "time[14]",
                "response[yes]:time[7]",
                "response[yes]:time[14]",
            ]
        );
        assert_eq!(dm.columns_for(&Term::Main("time".into())), Some(2..4));

        // row 4 is (yes, 7)
        let row4: Vec<f64> = (0..6).map(|j| dm.matrix()[(4, j)]).collect();
        assert_eq!(row4, vec![1.0, 1.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_select_terms() {
        let f = frame();
        let dm = DesignMatrix::from_formula(&f, &Formula::factorial("response", "time")).unwrap();
        let sub = dm.select_terms(&[Term::Main("time".into())]).unwrap();
        assert_eq!(sub.ncols(), 3);
        assert_eq!(sub.column(1), dm.matrix().column(2));
        assert!(dm.select_terms(&[Term::Main("sex".into())]).is_err());
    }
}
