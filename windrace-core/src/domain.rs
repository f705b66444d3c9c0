//! Domain types — site datasets and model parameters.
//!
//! A dataset maps site ids to a target series with optional exogenous
//! covariates and timestamps. Both optional sequences are aligned 1:1 with the
//! series: index `t` of `exog` and `timestamps` describes the same time step as
//! `series[t]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One time step of exogenous covariates (e.g. NWP wind speed, direction).
pub type ExogRow = BTreeMap<String, f64>;

/// A single model parameter value as written in the experiment config.
pub type ParamValue = serde_json::Value;

/// Model parameters keyed by name. `BTreeMap` keeps keys sorted, which the
/// display label and grid expansion both rely on.
pub type Params = BTreeMap<String, ParamValue>;

/// Per-site input data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteData {
    /// Target series (e.g. total power output), ordered in time.
    pub series: Vec<f64>,
    /// Exogenous covariates aligned with `series`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exog: Option<Vec<ExogRow>>,
    /// Timestamps aligned with `series`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<String>>,
}

impl SiteData {
    pub fn from_series(series: Vec<f64>) -> Self {
        Self {
            series,
            exog: None,
            timestamps: None,
        }
    }

    pub fn with_exog(mut self, exog: Vec<ExogRow>) -> Self {
        self.exog = Some(exog);
        self
    }

    pub fn with_timestamps(mut self, timestamps: Vec<String>) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// True when `exog` is absent or has exactly one row per series value.
    pub fn exog_aligned(&self) -> bool {
        self.exog
            .as_ref()
            .map_or(true, |rows| rows.len() == self.series.len())
    }

    /// True when `timestamps` is absent or has exactly one entry per series value.
    pub fn timestamps_aligned(&self) -> bool {
        self.timestamps
            .as_ref()
            .map_or(true, |ts| ts.len() == self.series.len())
    }
}

/// All sites of one experiment, keyed (and iterated) by site id.
pub type Dataset = BTreeMap<String, SiteData>;

/// Render a parameter value for a display label.
///
/// Strings render without quotes, everything else as compact JSON
/// (`8`, `0.05`, `true`, `[64,32]`, `null`).
pub fn format_param_value(value: &ParamValue) -> String {
    match value {
        ParamValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
