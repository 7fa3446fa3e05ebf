//! Ordinary Least Squares (OLS) regression on column-major design matrices.
//!
//! Used by the autoregressive adapter for its lag regression and for removing
//! exogenous effects. A singular system is reported as degenerate input rather
//! than regularised away.

use crate::error::FitError;

/// Relative pivot tolerance for the Cholesky factorisation.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// OLS regression coefficients and fit statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsResult {
    /// Intercept term (zero when fitted without one).
    pub intercept: f64,
    /// Regression coefficients, one per column.
    pub coefficients: Vec<f64>,
    /// Sum of squared residuals.
    pub ssr: f64,
    /// Residual degrees of freedom.
    pub dof: usize,
}

impl OlsResult {
    /// Predict one observation from its regressor values.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }

    /// Residual variance estimate, `ssr / dof`.
    pub fn sigma2(&self) -> f64 {
        if self.dof == 0 {
            0.0
        } else {
            self.ssr / self.dof as f64
        }
    }
}

/// Fit `y = intercept + X @ coefficients` by solving the normal equations.
///
/// `columns` holds the regressors column-major; every column must have `y.len()` rows.
pub fn ols_fit(y: &[f64], columns: &[&[f64]], intercept: bool) -> Result<OlsResult, FitError> {
    let n = y.len();
    let k = columns.len();
    let num_params = k + usize::from(intercept);

    if num_params == 0 {
        return Err(FitError::InvalidHyperparameter(
            "regression needs at least one parameter".into(),
        ));
    }
    if n <= num_params {
        return Err(FitError::InsufficientHistory {
            needed: num_params + 1,
            got: n,
        });
    }
    if let Some(col) = columns.iter().find(|c| c.len() != n) {
        return Err(FitError::DegenerateInput(format!(
            "regressor has {} rows, expected {}",
            col.len(),
            n
        )));
    }

    // Design row accessor: [1, x1, x2, ...] or [x1, x2, ...]
    let offset = usize::from(intercept);
    let value = |obs: usize, j: usize| -> f64 {
        if intercept && j == 0 {
            1.0
        } else {
            columns[j - offset][obs]
        }
    };

    let mut xtx = vec![vec![0.0; num_params]; num_params];
    let mut xty = vec![0.0; num_params];
    for obs in 0..n {
        for i in 0..num_params {
            let xi = value(obs, i);
            xty[i] += xi * y[obs];
            for j in 0..=i {
                xtx[i][j] += xi * value(obs, j);
            }
        }
    }
    for i in 0..num_params {
        for j in 0..i {
            xtx[j][i] = xtx[i][j];
        }
    }

    let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
        FitError::DegenerateInput("design matrix is singular or collinear".into())
    })?;

    let (intercept_value, coefficients) = if intercept {
        (beta[0], beta[1..].to_vec())
    } else {
        (0.0, beta)
    };

    let mut result = OlsResult {
        intercept: intercept_value,
        coefficients,
        ssr: 0.0,
        dof: n - num_params,
    };
    let mut row = vec![0.0; k];
    for obs in 0..n {
        for (j, col) in columns.iter().enumerate() {
            row[j] = col[obs];
        }
        result.ssr += (y[obs] - result.predict_row(&row)).powi(2);
    }

    Ok(result)
}

/// Solve symmetric positive definite system using Cholesky decomposition.
///
/// Returns `None` when a pivot falls below the relative tolerance, i.e. the
/// matrix is singular up to rounding.
pub(crate) fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    let scale = (0..n).map(|i| a[i][i].abs()).fold(0.0_f64, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }

    // Cholesky decomposition A = L @ L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum <= PIVOT_TOLERANCE * scale {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // Forward substitution: L @ y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // Backward substitution: L' @ x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}
