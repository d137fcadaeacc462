//! Inputs for the result presenter: per-cell-type p-value lookup and the
//! data behind the grouped box-plot grid.

pub mod panel;

pub use panel::{build_panel_grid, BoxSummary, GroupSeries, PanelGrid, PlotPanel};

use crate::data::StatResultSet;
use crate::error::{CellCountError, Result};
use std::collections::BTreeMap;

/// Map each cell type to its p-value for one term.
///
/// # Errors
/// * `AmbiguousTerm` if a cell type has more than one row for `term`
pub fn cell_type_pvalues(results: &StatResultSet, term: &str) -> Result<BTreeMap<String, f64>> {
    let mut pvalues = BTreeMap::new();
    for r in results.for_term(term) {
        if pvalues.insert(r.cell_type.clone(), r.p_value).is_some() {
            return Err(CellCountError::AmbiguousTerm {
                cell_type: r.cell_type.clone(),
                term: term.to_string(),
            });
        }
    }
    Ok(pvalues)
}

/// Format a p-value with three significant digits, switching to
/// exponent notation below 1e-4 (`0.0809`, `1.23e-05`).
pub fn format_pvalue(p: f64) -> String {
    const PRECISION: i32 = 3;
    if p.is_nan() {
        return "nan".to_string();
    }
    if p.is_infinite() {
        return if p > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if p == 0.0 {
        return "0".to_string();
    }

    // exponent after rounding to the requested precision
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, p);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };

    if (-4..PRECISION).contains(&exp) {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        strip_zeros(&format!("{:.*}", decimals, p))
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", strip_zeros(&mantissa), sign, exp.abs())
    }
}

fn strip_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StatResult;

    #[test]
    fn test_cell_type_pvalues() {
        let results = StatResultSet::new(vec![
            StatResult::anova_term("b_cell", "response", 1.0, 1.0, 2.0, 0.2),
            StatResult::anova_term("b_cell", "time_from_treatment_start", 1.0, 1.0, 2.0, 0.3),
            StatResult::anova_term("nk_cell", "response", 1.0, 1.0, 9.0, 0.01),
        ]);
        let map = cell_type_pvalues(&results, "response").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["b_cell"], 0.2);
        assert_eq!(map["nk_cell"], 0.01);
        assert!(cell_type_pvalues(&results, "sex").unwrap().is_empty());
    }

    #[test]
    fn test_cell_type_pvalues_ambiguous() {
        let results = StatResultSet::new(vec![
            StatResult::rank_test("b_cell", "response", 0.0, 0.2),
            StatResult::rank_test("b_cell", "response", 1.0, 0.4),
        ]);
        assert!(matches!(
            cell_type_pvalues(&results, "response"),
            Err(CellCountError::AmbiguousTerm { cell_type, .. }) if cell_type == "b_cell"
        ));
    }

    #[test]
    fn test_format_pvalue() {
        assert_eq!(format_pvalue(0.080856), "0.0809");
        assert_eq!(format_pvalue(0.5), "0.5");
        assert_eq!(format_pvalue(1.0), "1");
        assert_eq!(format_pvalue(0.00012345), "0.000123");
        assert_eq!(format_pvalue(1.234e-5), "1.23e-05");
        assert_eq!(format_pvalue(0.99996), "1");
        assert_eq!(format_pvalue(0.0), "0");
    }
}
