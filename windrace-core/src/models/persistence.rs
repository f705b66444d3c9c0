//! Persistence — the value observed `horizon` steps before the target.

use super::{last_or_zero, ForecastModel, ModelError};
use crate::domain::ExogRow;

/// Seasonal-naive-of-one baseline: `history[len - horizon]`.
///
/// With the backtester's `history = series[0..origin]`, a horizon-1 forecast
/// is the last observed value.
#[derive(Debug, Clone, Default)]
pub struct Persistence;

impl ForecastModel for Persistence {
    fn name(&self) -> &str {
        "persistence"
    }

    fn fit(&mut self, _series: &[f64], _exog_history: Option<&[ExogRow]>) -> Result<(), ModelError> {
        Ok(())
    }

    fn predict(
        &self,
        history: &[f64],
        horizon: usize,
        _exog_future: Option<&ExogRow>,
        _exog_future_seq: Option<&[ExogRow]>,
    ) -> Result<f64, ModelError> {
        if horizon >= 1 && history.len() >= horizon {
            return Ok(history[history.len() - horizon]);
        }
        Ok(last_or_zero(history))
    }
}
