//! Tabular autoregressive wrapper around an injected estimator.
//!
//! Gradient-boosted trees, random forests and neural nets all enter the
//! benchmark through this wrapper. The wrapper owns the feature-row layout and
//! the recursive multi-step rollout; the estimator itself is an opaque
//! `Regressor` obtained from an `EstimatorProvider` at fit time.
//!
//! Feature row for target step `t`:
//! `[y(t-1), y(t-2), .., y(t-lags), x₁(t), .., x_k(t)]`
//! where `x₁..x_k` are the resolved exogenous columns. Missing covariates
//! read as 0.0.

use std::sync::Arc;

use super::{last_or_zero, ForecastModel, ModelError};
use crate::domain::{ExogRow, Params};

/// A fitted-or-not regression estimator.
pub trait Regressor: Send {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ModelError>;
    fn predict(&self, row: &[f64]) -> Result<f64, ModelError>;
}

/// Builds a fresh estimator for one model instance.
///
/// Registered per model name in the `ModelRegistry`; receives the model's full
/// parameter map so estimator-specific knobs (`n_estimators`, `max_depth`, ..)
/// reach the estimator untouched.
pub trait EstimatorProvider: Send + Sync {
    fn make(&self, model_name: &str, params: &Params) -> Result<Box<dyn Regressor>, ModelError>;
}

pub struct TabularAutoreg {
    name: String,
    lags: usize,
    feature_cols_param: Option<Vec<String>>,
    params: Params,
    provider: Option<Arc<dyn EstimatorProvider>>,
    feature_cols: Vec<String>,
    estimator: Option<Box<dyn Regressor>>,
}

impl TabularAutoreg {
    pub fn new(
        name: impl Into<String>,
        lags: usize,
        feature_cols: Option<Vec<String>>,
        params: Params,
        provider: Option<Arc<dyn EstimatorProvider>>,
    ) -> Self {
        Self {
            name: name.into(),
            lags,
            feature_cols_param: feature_cols.filter(|cols| !cols.is_empty()),
            params,
            provider,
            feature_cols: Vec::new(),
            estimator: None,
        }
    }

    pub fn lags(&self) -> usize {
        self.lags
    }

    /// Exogenous columns resolved by the last `fit`.
    pub fn feature_cols(&self) -> &[String] {
        &self.feature_cols
    }

    pub fn is_fitted(&self) -> bool {
        self.estimator.is_some()
    }

    fn make_row(&self, history: &[f64], exog: Option<&ExogRow>) -> Vec<f64> {
        let mut row: Vec<f64> = (1..=self.lags).map(|i| history[history.len() - i]).collect();
        for col in &self.feature_cols {
            row.push(exog.and_then(|ex| ex.get(col)).copied().unwrap_or(0.0));
        }
        row
    }
}

/// Explicit columns win; otherwise the sorted keys of the first non-empty row.
fn resolve_feature_cols(exog_history: Option<&[ExogRow]>, explicit: Option<&[String]>) -> Vec<String> {
    if let Some(cols) = explicit {
        return cols.to_vec();
    }
    exog_history
        .and_then(|rows| rows.iter().find(|row| !row.is_empty()))
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

impl ForecastModel for TabularAutoreg {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, series: &[f64], exog_history: Option<&[ExogRow]>) -> Result<(), ModelError> {
        self.estimator = None;
        if self.lags < 1 || series.len() <= self.lags {
            return Ok(());
        }

        let provider = self
            .provider
            .clone()
            .ok_or_else(|| ModelError::MissingEstimator {
                model: self.name.clone(),
            })?;

        self.feature_cols =
            resolve_feature_cols(exog_history, self.feature_cols_param.as_deref());

        let mut x_rows = Vec::with_capacity(series.len() - self.lags);
        let mut y_vals = Vec::with_capacity(series.len() - self.lags);
        for t in self.lags..series.len() {
            let ex_row = exog_history.and_then(|rows| rows.get(t));
            x_rows.push(self.make_row(&series[..t], ex_row));
            y_vals.push(series[t]);
        }

        let mut estimator = provider.make(&self.name, &self.params)?;
        estimator.fit(&x_rows, &y_vals)?;
        self.estimator = Some(estimator);
        Ok(())
    }

    fn predict(
        &self,
        history: &[f64],
        horizon: usize,
        exog_future: Option<&ExogRow>,
        exog_future_seq: Option<&[ExogRow]>,
    ) -> Result<f64, ModelError> {
        let estimator = match &self.estimator {
            Some(est) if history.len() >= self.lags && !history.is_empty() => est,
            _ => return Ok(last_or_zero(history)),
        };

        let mut sim = history.to_vec();
        for step in 0..horizon {
            let ex_row = exog_future_seq
                .and_then(|seq| seq.get(step))
                .or(exog_future);
            let x = self.make_row(&sim, ex_row);
            sim.push(estimator.predict(&x)?);
        }
        Ok(last_or_zero(&sim))
    }
}
