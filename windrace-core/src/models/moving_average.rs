//! Moving average — mean of the trailing window, flat across horizons.

use super::{ForecastModel, ModelError};
use crate::domain::ExogRow;

#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
}

impl MovingAverage {
    /// A zero window is treated as a window of one.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new(6)
    }
}

impl ForecastModel for MovingAverage {
    fn name(&self) -> &str {
        "moving_average"
    }

    fn fit(&mut self, _series: &[f64], _exog_history: Option<&[ExogRow]>) -> Result<(), ModelError> {
        Ok(())
    }

    fn predict(
        &self,
        history: &[f64],
        _horizon: usize,
        _exog_future: Option<&ExogRow>,
        _exog_future_seq: Option<&[ExogRow]>,
    ) -> Result<f64, ModelError> {
        if history.is_empty() {
            return Ok(0.0);
        }
        let start = history.len().saturating_sub(self.window);
        let segment = &history[start..];
        Ok(segment.iter().sum::<f64>() / segment.len() as f64)
    }
}
