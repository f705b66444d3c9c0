//! Linear autoregression fit by ordinary least squares.
//!
//! `y(t) = c₀ + c₁·y(t-1) + .. + c_L·y(t-L)`, rolled forward recursively for
//! multi-step horizons.

use super::lstsq::solve_least_squares;
use super::{last_or_zero, ForecastModel, ModelError};
use crate::domain::ExogRow;

pub const DEFAULT_LAGS: usize = 12;

#[derive(Debug, Clone)]
pub struct LinearAr {
    lags: usize,
    coef: Option<Vec<f64>>,
}

impl LinearAr {
    pub fn new(lags: usize) -> Self {
        Self { lags, coef: None }
    }

    pub fn lags(&self) -> usize {
        self.lags
    }

    /// `[intercept, lag1, .., lagL]` after a successful fit.
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coef.as_deref()
    }
}

impl Default for LinearAr {
    fn default() -> Self {
        Self::new(DEFAULT_LAGS)
    }
}

/// `[1, y(t-1), .., y(t-lags)]` for every `t` in `lags..series.len()`.
pub(crate) fn lag_design(series: &[f64], lags: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut x_rows = Vec::with_capacity(series.len().saturating_sub(lags));
    let mut y_vals = Vec::with_capacity(series.len().saturating_sub(lags));
    for t in lags..series.len() {
        let mut row = Vec::with_capacity(lags + 1);
        row.push(1.0);
        row.extend((1..=lags).map(|i| series[t - i]));
        x_rows.push(row);
        y_vals.push(series[t]);
    }
    (x_rows, y_vals)
}

/// Intercept plus lag terms against the tail of `sim`.
pub(crate) fn lag_response(coef: &[f64], sim: &[f64], lags: usize) -> f64 {
    let mut val = coef[0];
    for i in 0..lags {
        val += coef[i + 1] * sim[sim.len() - 1 - i];
    }
    val
}

impl ForecastModel for LinearAr {
    fn name(&self) -> &str {
        "linear_ar"
    }

    fn fit(&mut self, series: &[f64], _exog_history: Option<&[ExogRow]>) -> Result<(), ModelError> {
        self.coef = None;
        if self.lags < 1 || series.len() <= self.lags {
            return Ok(());
        }
        let (x, y) = lag_design(series, self.lags);
        self.coef = Some(solve_least_squares(&x, &y, 0.0)?);
        Ok(())
    }

    fn predict(
        &self,
        history: &[f64],
        horizon: usize,
        _exog_future: Option<&ExogRow>,
        _exog_future_seq: Option<&[ExogRow]>,
    ) -> Result<f64, ModelError> {
        let Some(coef) = &self.coef else {
            return Ok(last_or_zero(history));
        };
        if history.is_empty() {
            return Ok(0.0);
        }

        let mut sim = history.to_vec();
        for _ in 0..horizon {
            let next = if sim.len() < self.lags {
                last_or_zero(&sim)
            } else {
                lag_response(coef, &sim, self.lags)
            };
            sim.push(next);
        }
        Ok(last_or_zero(&sim))
    }
}
