//! Model factory — converts a `(name, params)` pair into a runtime model.
//!
//! The built-in table covers the baseline and linear models. The tabular
//! families (`lightgbm`, `xgboost`, `random_forest`, `mlp`) are always
//! recognised, but only produce a fitted model when an `EstimatorProvider` has
//! been registered for them; otherwise `fit` fails with `MissingEstimator`.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::linear_ar::DEFAULT_LAGS;
use super::tabular::{EstimatorProvider, TabularAutoreg};
use super::{ForecastModel, LinearAr, LinearExog, ModelError, MovingAverage, Persistence};
use crate::domain::{ParamValue, Params};

/// Builds fresh model instances. Shared across worker threads.
pub trait ModelFactory: Send + Sync {
    /// Create an unfitted model. Unknown names fail with `UnknownModel`.
    fn create(&self, name: &str, params: &Params) -> Result<Box<dyn ForecastModel>, ModelError>;

    /// Sorted list of names `create` accepts.
    fn supported(&self) -> Vec<String>;
}

const BUILTIN_MODELS: [&str; 4] = ["persistence", "moving_average", "linear_ar", "linear_exog"];
const TABULAR_MODELS: [&str; 4] = ["lightgbm", "mlp", "random_forest", "xgboost"];

/// Default factory: built-in models plus injectable estimators.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    estimators: BTreeMap<String, Arc<dyn EstimatorProvider>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("estimators", &self.estimators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelRegistry {
    pub fn with_builtins() -> Self {
        Self::default()
    }

    /// Register an estimator for one of the tabular model names.
    pub fn with_estimator(mut self, model_name: impl Into<String>, provider: Arc<dyn EstimatorProvider>) -> Self {
        self.estimators.insert(model_name.into(), provider);
        self
    }

    /// Register the same estimator for every tabular model name.
    pub fn with_estimator_for_all(mut self, provider: Arc<dyn EstimatorProvider>) -> Self {
        for name in TABULAR_MODELS {
            self.estimators.insert(name.to_string(), Arc::clone(&provider));
        }
        self
    }

    pub fn has_estimator(&self, model_name: &str) -> bool {
        self.estimators.contains_key(model_name)
    }
}

impl ModelFactory for ModelRegistry {
    fn create(&self, name: &str, params: &Params) -> Result<Box<dyn ForecastModel>, ModelError> {
        match name {
            "persistence" => Ok(Box::new(Persistence)),
            "moving_average" => {
                let window = param_usize(name, params, "window", 6)?;
                Ok(Box::new(MovingAverage::new(window)))
            }
            "linear_ar" => {
                let lags = param_usize(name, params, "lags", DEFAULT_LAGS)?;
                Ok(Box::new(LinearAr::new(lags)))
            }
            "linear_exog" => {
                let lags = param_usize(name, params, "lags", DEFAULT_LAGS)?;
                let cols = param_string_list(name, params, "feature_cols")?;
                Ok(Box::new(LinearExog::new(lags, cols)))
            }
            tabular if TABULAR_MODELS.contains(&tabular) => {
                let lags = param_usize(name, params, "lags", DEFAULT_LAGS)?;
                let cols = param_string_list(name, params, "feature_cols")?;
                Ok(Box::new(TabularAutoreg::new(
                    tabular,
                    lags,
                    cols,
                    params.clone(),
                    self.estimators.get(tabular).cloned(),
                )))
            }
            _ => Err(ModelError::UnknownModel {
                name: name.to_string(),
                supported: self.supported().join(", "),
            }),
        }
    }

    fn supported(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_MODELS
            .iter()
            .chain(TABULAR_MODELS.iter())
            .map(|s| s.to_string())
            .collect();
        names.sort();
        names
    }
}

// ─── Param helpers ───────────────────────────────────────────────────

fn invalid(model: &str, param: &str, reason: impl Into<String>) -> ModelError {
    ModelError::InvalidParam {
        model: model.to_string(),
        param: param.to_string(),
        reason: reason.into(),
    }
}

/// Non-negative integer parameter. Negative values clamp to 0, which the
/// models treat as "never fit". Floats truncate toward zero.
fn param_usize(model: &str, params: &Params, name: &str, default: usize) -> Result<usize, ModelError> {
    match params.get(name) {
        None | Some(ParamValue::Null) => Ok(default),
        Some(ParamValue::Number(n)) => {
            if let Some(u) = n.as_u64() {
                Ok(u as usize)
            } else if let Some(i) = n.as_i64() {
                Ok(i.max(0) as usize)
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                Ok(if f.is_finite() && f > 0.0 { f as usize } else { 0 })
            }
        }
        Some(ParamValue::String(s)) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| invalid(model, name, format!("expected an integer, got \"{s}\""))),
        Some(other) => Err(invalid(model, name, format!("expected an integer, got {other}"))),
    }
}

/// Optional list of column names; an empty list means "not given".
fn param_string_list(model: &str, params: &Params, name: &str) -> Result<Option<Vec<String>>, ModelError> {
    match params.get(name) {
        None | Some(ParamValue::Null) => Ok(None),
        Some(ParamValue::Array(items)) => {
            let cols: Vec<String> = items
                .iter()
                .map(|v| match v {
                    ParamValue::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            Ok((!cols.is_empty()).then_some(cols))
        }
        Some(ParamValue::String(s)) if !s.is_empty() => Ok(Some(vec![s.clone()])),
        Some(ParamValue::String(_)) => Ok(None),
        Some(other) => Err(invalid(model, name, format!("expected a list of column names, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeastSquaresProvider;
    use serde_json::json;

    fn params(pairs: &[(&str, ParamValue)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn creates_every_supported_name() {
        let registry = ModelRegistry::with_builtins();
        for name in registry.supported() {
            let model = registry.create(&name, &Params::new()).unwrap();
            assert_eq!(model.name(), name);
        }
    }

    #[test]
    fn unknown_model_lists_supported_names() {
        let registry = ModelRegistry::with_builtins();
        let err = registry.create("prophet", &Params::new()).err().unwrap();
        let msg = err.to_string();
        assert!(msg.starts_with("unknown model 'prophet'"), "{msg}");
        assert!(msg.contains(
            "lightgbm, linear_ar, linear_exog, mlp, moving_average, persistence, random_forest, xgboost"
        ));
    }

    #[test]
    fn tabular_without_estimator_fails_at_fit() {
        let registry = ModelRegistry::with_builtins();
        let mut model = registry.create("xgboost", &Params::new()).unwrap();
        let series: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let err = model.fit(&series, None).unwrap_err();
        assert!(matches!(err, ModelError::MissingEstimator { .. }));
    }

    #[test]
    fn registered_estimator_is_used() {
        let registry = ModelRegistry::with_builtins()
            .with_estimator("xgboost", Arc::new(LeastSquaresProvider));
        assert!(registry.has_estimator("xgboost"));
        assert!(!registry.has_estimator("lightgbm"));

        let mut model = registry
            .create("xgboost", &params(&[("lags", json!(1))]))
            .unwrap();
        let series: Vec<f64> = (0..30).map(|i| i as f64).collect();
        model.fit(&series, None).unwrap();
        let y = model.predict(&series, 1, None, None).unwrap();
        assert!((y - 30.0).abs() < 1e-6);
    }

    #[test]
    fn param_parsing() {
        assert_eq!(param_usize("m", &params(&[("lags", json!(3))]), "lags", 12).unwrap(), 3);
        assert_eq!(param_usize("m", &params(&[("lags", json!(-2))]), "lags", 12).unwrap(), 0);
        assert_eq!(param_usize("m", &params(&[("lags", json!("4"))]), "lags", 12).unwrap(), 4);
        assert_eq!(param_usize("m", &Params::new(), "lags", 12).unwrap(), 12);
        assert!(param_usize("m", &params(&[("lags", json!([1]))]), "lags", 12).is_err());

        let cols = param_string_list("m", &params(&[("feature_cols", json!(["a", "b"]))]), "feature_cols")
            .unwrap();
        assert_eq!(cols, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(
            param_string_list("m", &params(&[("feature_cols", json!([]))]), "feature_cols").unwrap(),
            None
        );
    }

    #[test]
    fn invalid_param_surfaces_model_and_name() {
        let registry = ModelRegistry::with_builtins();
        let err = registry
            .create("moving_average", &params(&[("window", json!({"a": 1}))]))
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("invalid parameter 'window' for moving_average"));
    }
}
