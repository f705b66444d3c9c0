//! WindRace Core — domain types and the forecast model capability.
//!
//! This crate contains everything the orchestration engine needs to talk to
//! forecasting models without knowing their internals:
//! - Site datasets (target series, exogenous covariates, timestamps)
//! - The `ForecastModel` trait and its tagged implementations
//! - The injected `Regressor` capability behind the tabular autoregressive models
//! - The `ModelFactory` trait and the built-in `ModelRegistry`

pub mod domain;
pub mod models;

pub use domain::{format_param_value, Dataset, ExogRow, ParamValue, Params, SiteData};
pub use models::{
    category_for, EstimatorProvider, ForecastModel, LeastSquaresProvider, LeastSquaresRegressor,
    ModelCategory, ModelError, ModelFactory, ModelRegistry, Regressor,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the scheduler shares across worker
    /// threads is Send + Sync, and models can move into a worker.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<SiteData>();
        require_sync::<SiteData>();
        require_send::<Dataset>();
        require_sync::<Dataset>();
        require_send::<ModelRegistry>();
        require_sync::<ModelRegistry>();
        require_send::<ModelCategory>();
        require_sync::<ModelCategory>();
        require_send::<ModelError>();
        require_sync::<ModelError>();
        require_send::<Box<dyn ForecastModel>>();
    }

    #[test]
    fn forecast_model_history_is_borrowed_immutably() {
        // `predict` takes `&[f64]`: a model cannot mutate the caller's
        // history. If this compiles the contract holds.
        fn _check(model: &dyn ForecastModel, history: &[f64]) -> Result<f64, ModelError> {
            model.predict(history, 1, None, None)
        }
    }
}
