//! Linear autoregression with exogenous covariates.
//!
//! `y(t) = c₀ + Σ cᵢ·y(t-i) + Σ d_j·x_j(t)`. The covariates at the target step
//! come from `exog_future_seq[step]` when available, else `exog_future`.

use super::linear_ar::{lag_design, lag_response, DEFAULT_LAGS};
use super::lstsq::solve_least_squares;
use super::{last_or_zero, ForecastModel, ModelError};
use crate::domain::ExogRow;

#[derive(Debug, Clone)]
pub struct LinearExog {
    lags: usize,
    feature_cols_param: Option<Vec<String>>,
    feature_cols: Vec<String>,
    coef: Option<Vec<f64>>,
}

impl LinearExog {
    pub fn new(lags: usize, feature_cols: Option<Vec<String>>) -> Self {
        Self {
            lags,
            feature_cols_param: feature_cols.filter(|cols| !cols.is_empty()),
            feature_cols: Vec::new(),
            coef: None,
        }
    }

    /// Build an already-fitted model from known coefficients
    /// (`[intercept, lag1..lagL, feature1..featureK]`).
    pub fn from_coefficients(lags: usize, feature_cols: Vec<String>, coef: Vec<f64>) -> Result<Self, ModelError> {
        if coef.len() != 1 + lags + feature_cols.len() {
            return Err(ModelError::InvalidParam {
                model: "linear_exog".into(),
                param: "coef".into(),
                reason: format!(
                    "expected {} coefficients, got {}",
                    1 + lags + feature_cols.len(),
                    coef.len()
                ),
            });
        }
        Ok(Self {
            lags,
            feature_cols_param: Some(feature_cols.clone()),
            feature_cols,
            coef: Some(coef),
        })
    }

    pub fn lags(&self) -> usize {
        self.lags
    }

    pub fn feature_cols(&self) -> &[String] {
        &self.feature_cols
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coef.as_deref()
    }
}

impl Default for LinearExog {
    fn default() -> Self {
        Self::new(DEFAULT_LAGS, None)
    }
}

impl ForecastModel for LinearExog {
    fn name(&self) -> &str {
        "linear_exog"
    }

    fn fit(&mut self, series: &[f64], exog_history: Option<&[ExogRow]>) -> Result<(), ModelError> {
        self.coef = None;
        if self.lags < 1 || series.len() <= self.lags {
            return Ok(());
        }
        let Some(exog) = exog_history.filter(|rows| rows.len() >= series.len()) else {
            return Ok(());
        };

        self.feature_cols = match &self.feature_cols_param {
            Some(cols) => cols.clone(),
            None => exog[0].keys().cloned().collect(),
        };

        let (mut x, y) = lag_design(series, self.lags);
        for (row, t) in x.iter_mut().zip(self.lags..) {
            let ex = &exog[t];
            row.extend(
                self.feature_cols
                    .iter()
                    .map(|col| ex.get(col).copied().unwrap_or(0.0)),
            );
        }
        self.coef = Some(solve_least_squares(&x, &y, 0.0)?);
        Ok(())
    }

    fn predict(
        &self,
        history: &[f64],
        horizon: usize,
        exog_future: Option<&ExogRow>,
        exog_future_seq: Option<&[ExogRow]>,
    ) -> Result<f64, ModelError> {
        let Some(coef) = &self.coef else {
            return Ok(last_or_zero(history));
        };
        if history.is_empty() || history.len() < self.lags {
            return Ok(last_or_zero(history));
        }

        let offset = 1 + self.lags;
        let mut sim = history.to_vec();
        for step in 0..horizon {
            let ex = exog_future_seq
                .and_then(|seq| seq.get(step))
                .or(exog_future);
            let mut val = lag_response(coef, &sim, self.lags);
            for (j, col) in self.feature_cols.iter().enumerate() {
                let x = ex.and_then(|row| row.get(col)).copied().unwrap_or(0.0);
                val += coef[offset + j] * x;
            }
            sim.push(val);
        }
        Ok(last_or_zero(&sim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(f: f64) -> ExogRow {
        ExogRow::from([("f".to_string(), f)])
    }

    #[test]
    fn per_step_covariates_take_precedence_over_target_row() {
        // GIVEN y = f(t) exactly, no lag or intercept contribution
        let m = LinearExog::from_coefficients(1, vec!["f".into()], vec![0.0, 0.0, 1.0]).unwrap();
        // WHEN rolling two steps with a per-step sequence
        let y = m
            .predict(&[10.0], 2, Some(&row(9.0)), Some(&[row(1.0), row(2.0)]))
            .unwrap();
        // THEN the last step reads seq[1], not exog_future
        assert_eq!(y, 2.0);
    }

    #[test]
    fn falls_back_to_target_row_without_sequence() {
        let m = LinearExog::from_coefficients(1, vec!["f".into()], vec![0.0, 0.0, 1.0]).unwrap();
        assert_eq!(m.predict(&[10.0], 2, Some(&row(9.0)), None).unwrap(), 9.0);
    }

    #[test]
    fn stays_unfit_without_enough_exog() {
        let mut m = LinearExog::new(1, None);
        let series = [1.0, 2.0, 3.0, 4.0];
        m.fit(&series, Some(&[row(1.0), row(2.0)])).unwrap();
        assert!(m.coefficients().is_none());
        m.fit(&series, None).unwrap();
        assert!(m.coefficients().is_none());
        assert_eq!(m.predict(&series, 1, None, None).unwrap(), 4.0);
    }

    #[test]
    fn learns_covariate_relation() {
        let xs = [0.0, 3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0, 5.0, 3.0, 5.0];
        let rows: Vec<ExogRow> = xs.iter().map(|&x| row(x)).collect();
        let mut m = LinearExog::new(1, None);
        m.fit(&xs, Some(&rows)).unwrap();
        assert_eq!(m.feature_cols(), &["f".to_string()]);
        let y = m.predict(&xs, 1, Some(&row(7.0)), None).unwrap();
        assert!((y - 7.0).abs() < 1e-6, "got {y}");
    }

    #[test]
    fn coefficient_count_is_checked() {
        assert!(LinearExog::from_coefficients(2, vec!["f".into()], vec![0.0, 1.0]).is_err());
    }
}
