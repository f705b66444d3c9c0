//! Forecast models — the pluggable capability the backtester drives.
//!
//! Each model forecasts the power output of one wind site: it sees the target
//! history (and optionally NWP covariates) and returns a point forecast
//! `horizon` steps past the end of that history. The backtester owns the
//! no-lookahead protocol; models only honor the contract below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ExogRow;

pub mod factory;
pub mod lstsq;
pub mod moving_average;
pub mod persistence;
pub mod linear_ar;
pub mod linear_exog;
pub mod tabular;

pub use factory::{ModelFactory, ModelRegistry};
pub use linear_ar::LinearAr;
pub use linear_exog::LinearExog;
pub use lstsq::{LeastSquaresProvider, LeastSquaresRegressor};
pub use moving_average::MovingAverage;
pub use persistence::Persistence;
pub use tabular::{EstimatorProvider, Regressor, TabularAutoreg};

// ─── Error type ──────────────────────────────────────────────────────

/// Errors raised while constructing, fitting, or querying a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown model '{name}'. Supported: {supported}")]
    UnknownModel { name: String, supported: String },
    #[error("{model} model requires an injected estimator")]
    MissingEstimator { model: String },
    #[error("invalid parameter '{param}' for {model}: {reason}")]
    InvalidParam {
        model: String,
        param: String,
        reason: String,
    },
    #[error("least-squares system is singular")]
    Singular,
    #[error("{0}")]
    Runtime(String),
}

// ─── Capability trait ────────────────────────────────────────────────

/// A forecasting model.
///
/// # Contract
/// - Deterministic: identical `fit` inputs followed by identical `predict`
///   inputs produce identical outputs.
/// - Inputs are borrowed immutably; a model never mutates `series`,
///   `history`, or any exogenous slice it is handed.
/// - `predict` may be called without a prior successful `fit`; models fall
///   back to a naive forecast in that case rather than failing.
pub trait ForecastModel: Send {
    /// Registry name (e.g., "linear_ar").
    fn name(&self) -> &str;

    /// Fit on a training series, with exogenous rows aligned 1:1 if present.
    fn fit(&mut self, series: &[f64], exog_history: Option<&[ExogRow]>) -> Result<(), ModelError>;

    /// Forecast the value `horizon` steps after the last element of `history`.
    ///
    /// `exog_future` holds the covariates at the target step;
    /// `exog_future_seq[k]` holds the covariates at step `k + 1` ahead, so a
    /// model can roll a multi-step forecast forward one step at a time.
    fn predict(
        &self,
        history: &[f64],
        horizon: usize,
        exog_future: Option<&ExogRow>,
        exog_future_seq: Option<&[ExogRow]>,
    ) -> Result<f64, ModelError>;
}

// ─── Resource categories ─────────────────────────────────────────────

/// Resource class of a model, used for per-category admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    Boost,
    Forest,
    Nn,
    Linear,
    Baseline,
}

impl ModelCategory {
    pub const ALL: [ModelCategory; 5] = [
        ModelCategory::Boost,
        ModelCategory::Forest,
        ModelCategory::Nn,
        ModelCategory::Linear,
        ModelCategory::Baseline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boost => "boost",
            Self::Forest => "forest",
            Self::Nn => "nn",
            Self::Linear => "linear",
            Self::Baseline => "baseline",
        }
    }
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed model-name → category lookup. Unknown names are `Baseline`.
pub fn category_for(model_name: &str) -> ModelCategory {
    match model_name.to_ascii_lowercase().as_str() {
        "lightgbm" | "xgboost" => ModelCategory::Boost,
        "random_forest" => ModelCategory::Forest,
        "mlp" => ModelCategory::Nn,
        "linear_ar" | "linear_exog" => ModelCategory::Linear,
        _ => ModelCategory::Baseline,
    }
}

/// Last value of a history, or 0.0 when empty. The shared naive fallback.
pub(crate) fn last_or_zero(history: &[f64]) -> f64 {
    history.last().copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_lookup() {
        assert_eq!(category_for("lightgbm"), ModelCategory::Boost);
        assert_eq!(category_for("XGBoost"), ModelCategory::Boost);
        assert_eq!(category_for("random_forest"), ModelCategory::Forest);
        assert_eq!(category_for("mlp"), ModelCategory::Nn);
        assert_eq!(category_for("linear_exog"), ModelCategory::Linear);
        assert_eq!(category_for("persistence"), ModelCategory::Baseline);
        assert_eq!(category_for("something_new"), ModelCategory::Baseline);
    }

    #[test]
    fn category_names_roundtrip_through_serde() {
        for cat in ModelCategory::ALL {
            let json = serde_json::to_string(&cat).unwrap();
            assert_eq!(json, format!("\"{}\"", cat.as_str()));
            let back: ModelCategory = serde_json::from_str(&json).unwrap();
            assert_eq!(back, cat);
        }
    }
}
