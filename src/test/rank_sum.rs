//! Wilcoxon rank-sum (Mann-Whitney U) test.
//!
//! Two-sided, using the normal approximation with a tie-corrected variance
//! and a continuity correction of 0.5.

use crate::error::{CellCountError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Result of a rank-sum test between two samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankSumResult {
    /// U statistic of the first sample.
    pub u_statistic: f64,
    /// Standardised statistic after continuity correction.
    pub z: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Size of the first sample.
    pub n1: usize,
    /// Size of the second sample.
    pub n2: usize,
}

/// Compare two samples with the Mann-Whitney U test.
///
/// # Errors
/// * `InsufficientData` if either sample is empty
/// * `Numerical` if a value is not finite
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> Result<RankSumResult> {
    if x.is_empty() || y.is_empty() {
        return Err(CellCountError::InsufficientData(format!(
            "Rank-sum test needs both groups non-empty (got {} and {})",
            x.len(),
            y.len()
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(CellCountError::Numerical(
            "Rank-sum test input contains non-finite values".to_string(),
        ));
    }

    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let n = n1 + n2;

    let mut pooled: Vec<(f64, bool)> = x
        .iter()
        .map(|&v| (v, true))
        .chain(y.iter().map(|&v| (v, false)))
        .collect();
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    // average ranks over ties
    let mut rank_sum_x = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < pooled.len() {
        let mut j = i;
        while j < pooled.len() && pooled[j].0 == pooled[i].0 {
            j += 1;
        }
        let t = (j - i) as f64;
        let avg_rank = (i + j + 1) as f64 / 2.0;
        rank_sum_x += pooled[i..j].iter().filter(|(_, in_x)| *in_x).count() as f64 * avg_rank;
        tie_term += t * t * t - t;
        i = j;
    }

    let u1 = rank_sum_x - n1 * (n1 + 1.0) / 2.0;
    let u2 = n1 * n2 - u1;
    let u = u1.max(u2);
    let mu = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));

    if variance <= 0.0 {
        // every value tied
        return Ok(RankSumResult {
            u_statistic: u1,
            z: 0.0,
            p_value: 1.0,
            n1: x.len(),
            n2: y.len(),
        });
    }

    let z = (u - mu - 0.5) / variance.sqrt();
    let normal = Normal::new(0.0, 1.0).map_err(|e| CellCountError::Numerical(e.to_string()))?;
    let p_value = (2.0 * normal.sf(z)).clamp(0.0, 1.0);

    Ok(RankSumResult {
        u_statistic: u1,
        z,
        p_value,
        n1: x.len(),
        n2: y.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clear_separation() {
        let responders = [10.0, 20.0, 30.0];
        let non_responders = [40.0, 50.0, 60.0];
        let r = mann_whitney_u(&responders, &non_responders).unwrap();

        assert_relative_eq!(r.u_statistic, 0.0);
        assert!(r.p_value < 0.1);
        assert_relative_eq!(r.p_value, 0.080856, epsilon = 1e-5);
    }

    #[test]
    fn test_symmetric_in_argument_order() {
        let a = [1.2, 3.4, 2.2, 5.0, 4.1];
        let b = [6.3, 2.9, 7.7, 8.1];
        let ab = mann_whitney_u(&a, &b).unwrap();
        let ba = mann_whitney_u(&b, &a).unwrap();
        assert_relative_eq!(ab.p_value, ba.p_value, epsilon = 1e-12);
        assert_relative_eq!(ab.u_statistic + ba.u_statistic, 20.0);
    }

    #[test]
    fn test_identical_distributions() {
        let a = [10.0, 20.0, 30.0];
        let r = mann_whitney_u(&a, &a).unwrap();
        assert_relative_eq!(r.p_value, 1.0);
    }

    #[test]
    fn test_all_tied() {
        let r = mann_whitney_u(&[5.0, 5.0], &[5.0, 5.0, 5.0]).unwrap();
        assert_relative_eq!(r.p_value, 1.0);
    }

    #[test]
    fn test_ties_reduce_variance() {
        // hand-checked against the tie-corrected normal approximation
        let r = mann_whitney_u(&[1.0, 2.0, 2.0, 3.0], &[2.0, 4.0, 5.0, 5.0]).unwrap();
        assert_relative_eq!(r.u_statistic, 2.0);
        assert!(r.p_value > 0.05 && r.p_value < 0.2);
    }

    #[test]
    fn test_empty_group() {
        assert!(matches!(
            mann_whitney_u(&[], &[1.0]),
            Err(CellCountError::InsufficientData(_))
        ));
        assert!(mann_whitney_u(&[1.0], &[f64::NAN]).is_err());
    }
}
