//! Ordinary least squares via the normal equations.
//!
//! The linear models fit small dense systems (one column per lag plus a few
//! covariates), so forming `XᵀX` and eliminating with partial pivoting is
//! plenty. Rank-deficient systems (constant training windows, duplicated
//! covariates) get a tiny ridge term so the solve still produces a
//! deterministic, bounded solution.

use super::tabular::{EstimatorProvider, Regressor};
use super::ModelError;
use crate::domain::Params;

const PIVOT_EPS: f64 = 1e-10;
const FALLBACK_RIDGE: f64 = 1e-8;

/// Solve `min ||X·b − y||² + ridge·||b||²`.
///
/// Retries once with a small ridge term when the unregularised system is
/// singular. Returns `ModelError::Singular` if that also fails, or if the
/// inputs are empty or ragged.
pub fn solve_least_squares(x: &[Vec<f64>], y: &[f64], ridge: f64) -> Result<Vec<f64>, ModelError> {
    if x.is_empty() || x.len() != y.len() {
        return Err(ModelError::Singular);
    }
    let n_cols = x[0].len();
    if n_cols == 0 || x.iter().any(|row| row.len() != n_cols) {
        return Err(ModelError::Singular);
    }

    let (xtx, xty) = normal_equations(x, y, n_cols);

    match solve_with_ridge(&xtx, &xty, ridge) {
        Some(coef) => Ok(coef),
        None => {
            let scale = (0..n_cols).map(|i| xtx[i][i]).sum::<f64>() / n_cols as f64;
            let ridge = ridge.max(FALLBACK_RIDGE * scale.max(1.0));
            solve_with_ridge(&xtx, &xty, ridge).ok_or(ModelError::Singular)
        }
    }
}

fn normal_equations(x: &[Vec<f64>], y: &[f64], n_cols: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut xtx = vec![vec![0.0; n_cols]; n_cols];
    let mut xty = vec![0.0; n_cols];
    for (row, &target) in x.iter().zip(y) {
        for i in 0..n_cols {
            xty[i] += row[i] * target;
            for j in i..n_cols {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..n_cols {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
    }
    (xtx, xty)
}

/// Gaussian elimination with partial pivoting on `(A + ridge·I) b = rhs`.
fn solve_with_ridge(a: &[Vec<f64>], rhs: &[f64], ridge: f64) -> Option<Vec<f64>> {
    let n = rhs.len();
    let mut m: Vec<Vec<f64>> = a
        .iter()
        .zip(rhs)
        .enumerate()
        .map(|(i, (row, &b))| {
            let mut r = row.clone();
            r[i] += ridge;
            r.push(b);
            r
        })
        .collect();

    let tol = PIVOT_EPS * (0..n).map(|i| a[i][i].abs()).fold(1.0, f64::max);
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&p, &q| m[p][col].abs().total_cmp(&m[q][col].abs()))?;
        if m[pivot_row][col].abs() < tol {
            return None;
        }
        m.swap(col, pivot_row);
        let pivot = m[col].clone();
        for row in m.iter_mut().skip(col + 1) {
            let factor = row[col] / pivot[col];
            if factor == 0.0 {
                continue;
            }
            for c in col..=n {
                row[c] -= factor * pivot[c];
            }
        }
    }

    let mut coef = vec![0.0; n];
    for i in (0..n).rev() {
        let mut acc = m[i][n];
        for j in (i + 1)..n {
            acc -= m[i][j] * coef[j];
        }
        coef[i] = acc / m[i][i];
    }
    coef.iter().all(|c| c.is_finite()).then_some(coef)
}

// ─── Reference estimator ─────────────────────────────────────────────

/// Linear regressor usable wherever an injected estimator is expected.
///
/// Stands in for gradient-boosted trees / forests / networks in tests and
/// demos; the tabular wrapper treats it exactly like any other estimator.
#[derive(Debug, Clone)]
pub struct LeastSquaresRegressor {
    ridge: f64,
    fit_intercept: bool,
    coef: Option<Vec<f64>>,
}

impl LeastSquaresRegressor {
    pub fn new(ridge: f64, fit_intercept: bool) -> Self {
        Self {
            ridge: ridge.max(0.0),
            fit_intercept,
            coef: None,
        }
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coef.as_deref()
    }
}

impl Default for LeastSquaresRegressor {
    fn default() -> Self {
        Self::new(0.0, true)
    }
}

impl Regressor for LeastSquaresRegressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError> {
        let design: Vec<Vec<f64>> = if self.fit_intercept {
            x.iter()
                .map(|row| std::iter::once(1.0).chain(row.iter().copied()).collect())
                .collect()
        } else {
            x.to_vec()
        };
        self.coef = Some(solve_least_squares(&design, y, self.ridge)?);
        Ok(())
    }

    fn predict(&self, row: &[f64]) -> Result<f64, ModelError> {
        let coef = self
            .coef
            .as_ref()
            .ok_or_else(|| ModelError::Runtime("estimator used before fit".into()))?;
        let (intercept, weights) = if self.fit_intercept {
            (coef[0], &coef[1..])
        } else {
            (0.0, &coef[..])
        };
        if weights.len() != row.len() {
            return Err(ModelError::Runtime(format!(
                "feature row has {} columns, estimator was fit on {}",
                row.len(),
                weights.len()
            )));
        }
        Ok(intercept + weights.iter().zip(row).map(|(w, v)| w * v).sum::<f64>())
    }
}

/// Provider that hands out fresh `LeastSquaresRegressor`s.
///
/// Reads an optional `ridge` parameter (default 0.0) from the model params.
#[derive(Debug, Clone, Default)]
pub struct LeastSquaresProvider;

impl EstimatorProvider for LeastSquaresProvider {
    fn make(&self, _model_name: &str, params: &Params) -> Result<Box<dyn Regressor>, ModelError> {
        let ridge = params.get("ridge").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok(Box::new(LeastSquaresRegressor::new(ridge, true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_linear_relation() {
        // y = 2 + 3a - b
        let x: Vec<Vec<f64>> = vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![1.0, 0.0, 1.0],
            vec![1.0, 2.0, 3.0],
            vec![1.0, 5.0, 1.0],
        ];
        let y: Vec<f64> = x.iter().map(|r| 2.0 + 3.0 * r[1] - r[2]).collect();
        let coef = solve_least_squares(&x, &y, 0.0).unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-9);
        assert!((coef[1] - 3.0).abs() < 1e-9);
        assert!((coef[2] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn rank_deficient_system_still_solves() {
        // Two identical columns: the plain normal equations are singular.
        let x = vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]];
        let y = vec![2.0, 4.0, 6.0];
        let coef = solve_least_squares(&x, &y, 0.0).unwrap();
        let fitted = coef[0] * 2.0 + coef[1] * 2.0;
        assert!((fitted - 4.0).abs() < 1e-4);
    }

    #[test]
    fn ragged_input_is_rejected() {
        let x = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            solve_least_squares(&x, &[1.0, 2.0], 0.0),
            Err(ModelError::Singular)
        ));
    }

    #[test]
    fn regressor_predicts_with_intercept() {
        let mut reg = LeastSquaresRegressor::default();
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        reg.fit(&x, &[1.0, 3.0, 5.0]).unwrap();
        assert!((reg.predict(&[3.0]).unwrap() - 7.0).abs() < 1e-9);
        assert!(reg.predict(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn regressor_unfit_errors() {
        let reg = LeastSquaresRegressor::default();
        assert!(reg.predict(&[1.0]).is_err());
    }
}
