//! Walk-forward backtest — rolling-origin evaluation of one model on one site.
//!
//! For every origin in `train_size ..= len - max_h` the model sees
//! `series[..origin]` only. Exogenous covariates at and after the origin are
//! the one exception: they stand for externally forecast weather and are
//! passed to `predict` for the target step and the steps leading up to it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use windrace_core::{ExogRow, ForecastModel, ModelError, SiteData};

use crate::config::{validate_horizons, ConfigError};

/// Exogenous keys searched (in order) for the wind speed reported with each
/// prediction.
pub const WIND_SPEED_KEYS: [&str; 6] = [
    "wind_speed",
    "WindSpeed",
    "wind_speed_100m",
    "wind_speed_10m",
    "ws",
    "WS",
];

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub horizons: Vec<usize>,
    pub train_size: usize,
    pub refit_each_origin: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            horizons: vec![1, 2, 4],
            train_size: 120,
            refit_each_origin: true,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// One forecast against its ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub site_id: String,
    /// Display label of the model variant.
    pub model_name: String,
    pub origin_index: usize,
    pub horizon: usize,
    pub timestamp: Option<String>,
    pub wind_speed: Option<f64>,
    pub y_true: f64,
    pub y_pred: f64,
}

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

// ─── Origins ─────────────────────────────────────────────────────────

/// Origins visited for a series of length `len`. Empty when
/// `len < train_size + max_h`.
pub fn origins(len: usize, train_size: usize, max_h: usize) -> std::ops::Range<usize> {
    if len < train_size + max_h {
        return 0..0;
    }
    train_size..(len - max_h + 1)
}

/// First preferred wind-speed key present in `row`.
pub fn extract_wind_speed(row: &ExogRow) -> Option<f64> {
    WIND_SPEED_KEYS.iter().find_map(|k| row.get(*k).copied())
}

// ─── Backtest loop ───────────────────────────────────────────────────

/// Run the rolling-origin protocol and return predictions in
/// (origin, configured horizon order).
pub fn backtest(
    site_id: &str,
    site: &SiteData,
    model: &mut dyn ForecastModel,
    model_label: &str,
    config: &WalkForwardConfig,
) -> Result<Vec<PredictionRow>, BacktestError> {
    validate_horizons(&config.horizons)?;
    let max_h = config.horizons.iter().copied().max().unwrap_or(1);

    let series = site.series.as_slice();
    let exog = site.exog.as_deref();
    let timestamps = site.timestamps.as_deref();

    let range = origins(series.len(), config.train_size, max_h);
    if range.is_empty() {
        return Ok(Vec::new());
    }

    if !config.refit_each_origin {
        model.fit(&series[..config.train_size], exog.map(|ex| prefix(ex, config.train_size)))?;
    }

    let mut rows = Vec::with_capacity(range.len() * config.horizons.len());
    for origin in range {
        let history = &series[..origin];
        if config.refit_each_origin {
            model.fit(history, exog.map(|ex| prefix(ex, origin)))?;
        }

        for &h in &config.horizons {
            let target = origin + h - 1;
            let exog_target = exog.and_then(|ex| ex.get(target));
            let exog_seq = exog.map(|ex| &ex[origin.min(ex.len())..(target + 1).min(ex.len())]);

            let y_pred = model.predict(history, h, exog_target, exog_seq)?;
            rows.push(PredictionRow {
                site_id: site_id.to_string(),
                model_name: model_label.to_string(),
                origin_index: origin,
                horizon: h,
                timestamp: timestamps.and_then(|ts| ts.get(target)).cloned(),
                wind_speed: exog_target.and_then(extract_wind_speed),
                y_true: series[target],
                y_pred,
            });
        }
    }
    Ok(rows)
}

fn prefix(rows: &[ExogRow], end: usize) -> &[ExogRow] {
    &rows[..end.min(rows.len())]
}
