//! Linear model fitting via OLS.

use crate::error::{CellCountError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Results from fitting a linear model to one response vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmFit {
    /// Estimated coefficients (minimum-norm when the design is rank deficient).
    pub coefficients: Vec<f64>,
    /// Residuals.
    #[serde(skip)]
    pub residuals: Vec<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    /// Numerical rank of the design matrix.
    pub rank: usize,
    /// Number of observations.
    pub n_observations: usize,
    /// Degrees of freedom (residual).
    pub df_residual: usize,
    /// R-squared.
    pub r_squared: f64,
}

impl LmFit {
    /// Residual variance estimate. `NaN` without residual degrees of freedom.
    pub fn sigma_squared(&self) -> f64 {
        if self.df_residual > 0 {
            self.rss / self.df_residual as f64
        } else {
            f64::NAN
        }
    }
}

/// Fit `y ~ x` by ordinary least squares.
///
/// Uses an SVD so that rank-deficient designs (e.g. an interaction cell
/// with no observations) still fit; the dropped directions show up as a
/// lower `rank` rather than an error.
pub fn fit_ols(x: &DMatrix<f64>, y: &[f64]) -> Result<LmFit> {
    let n = y.len();
    if x.nrows() != n {
        return Err(CellCountError::ModelFit(format!(
            "Design has {} rows for {} observations",
            x.nrows(),
            n
        )));
    }
    if n == 0 {
        return Err(CellCountError::ModelFit("No observations to fit".to_string()));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(CellCountError::Numerical(
            "Response contains non-finite values".to_string(),
        ));
    }

    let y_vec = DVector::from_column_slice(y);
    let svd = x.clone().svd(true, true);
    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let tol = max_sv * (n.max(x.ncols()) as f64) * f64::EPSILON;
    let rank = svd.rank(tol);

    let beta = svd
        .solve(&y_vec, tol)
        .map_err(|e| CellCountError::ModelFit(e.to_string()))?;

    let fitted = x * &beta;
    let residuals_vec = &y_vec - &fitted;
    let rss: f64 = residuals_vec.iter().map(|e| e * e).sum();

    let y_mean = y.iter().sum::<f64>() / n as f64;
    let tss: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    Ok(LmFit {
        coefficients: beta.iter().cloned().collect(),
        residuals: residuals_vec.iter().cloned().collect(),
        rss,
        rank,
        n_observations: n,
        df_residual: n.saturating_sub(rank),
        r_squared,
    })
}
