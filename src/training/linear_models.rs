//! Linear regression engine

use super::{check_xy, Deadline, Regressor};
use crate::error::{Result, VelotuneError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Ridge added to the diagonal on each retry, relative to the mean diagonal
const RIDGE_STEPS: [f64; 3] = [1e-8, 1e-6, 1e-4];

/// Solve the symmetric system Ax = b by Cholesky, retrying with a growing
/// ridge while A is not positive definite (collinear or constant columns).
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    if let Some(x) = cholesky_factor_solve(a, b) {
        return Some(x);
    }

    let scale = (a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64).max(1.0);
    RIDGE_STEPS.iter().find_map(|step| {
        let mut a_reg = a.clone();
        a_reg.diag_mut().mapv_inplace(|d| d + step * scale);
        cholesky_factor_solve(&a_reg, b)
    })
}

/// Factor A = L * L^T and substitute; None if A is not positive definite
fn cholesky_factor_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 1e-12 * a[[i, i]].abs() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Ordinary least squares with optional L2 penalty on the coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Fitted coefficients (weights)
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept (bias)
    pub intercept: Option<f64>,
    /// Regularization strength (L2); the intercept is never penalized
    pub alpha: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    /// Create a new linear regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            alpha: 0.0,
        }
    }

    /// Set regularization strength
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    fn solve(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Array1<f64>> {
        // (X^T X + alpha*I) w = X^T y
        let mut xtx = x.t().dot(x);
        for i in 0..xtx.nrows() {
            xtx[[i, i]] += self.alpha;
        }
        let xty = x.t().dot(y);

        cholesky_solve(&xtx, &xty).ok_or_else(|| {
            VelotuneError::FitFailure("design matrix is singular".to_string())
        })
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, deadline: &Deadline) -> Result<()> {
        check_xy(x, y)?;
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(VelotuneError::InvalidParameter {
                name: "penalty".to_string(),
                value: self.alpha.to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }

        // Center so the intercept stays unpenalized
        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| VelotuneError::FitFailure("no training rows".to_string()))?;
        let y_mean = y.mean().unwrap_or(0.0);
        let x_centered = x - &x_mean.view().insert_axis(Axis(0));
        let y_centered = y - y_mean;

        let coefficients = self.solve(&x_centered, &y_centered)?;
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(VelotuneError::FitFailure(
                "non-finite coefficient".to_string(),
            ));
        }
        deadline.check()?;

        self.intercept = Some(y_mean - coefficients.dot(&x_mean));
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (coefficients, intercept) = match (&self.coefficients, self.intercept) {
            (Some(c), Some(b)) => (c, b),
            _ => return Err(VelotuneError::ModelNotFitted),
        };
        if x.ncols() != coefficients.len() {
            return Err(VelotuneError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + intercept)
    }
}
