//! End-to-end experiment: expand → schedule → evaluate → rank.
//!
//! `run_experiment` performs no I/O. Persisting the outcome is the job of
//! `export::save_run_artifacts` and `registry::DatasetRegistry`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use windrace_core::{Dataset, ModelFactory};

use crate::config::ExperimentConfig;
use crate::data_loader::DatasetStats;
use crate::evaluator::{evaluate, MetricRow};
use crate::expander::{expand, TaskTemplate};
use crate::leaderboard::{self, LeaderboardRow};
use crate::registry::DatasetVersion;
use crate::scheduler::{self, FailureRecord, RunError, SchedulerConfig};
use crate::stability::{self, StabilityRow};
use crate::walk_forward::PredictionRow;

/// Reproducibility record written next to the artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub experiment: String,
    pub dataset_version: String,
    pub config_fingerprint: String,
    pub horizons: Vec<usize>,
    pub sites: Vec<String>,
    pub models: Vec<TaskTemplate>,
    pub train_size: usize,
    pub refit_each_origin: bool,
    pub max_workers: usize,
    pub model_type_limits: BTreeMap<String, usize>,
    pub skip_failed_models: bool,
    pub task_count: usize,
    pub prediction_count: usize,
    pub failed_models: Vec<FailureRecord>,
    pub time_start: String,
    pub time_end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_stats: Option<DatasetStats>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    pub config: ExperimentConfig,
    pub templates: Vec<TaskTemplate>,
    pub sites: Vec<String>,
    pub predictions: Vec<PredictionRow>,
    pub failures: Vec<FailureRecord>,
    pub metrics: Vec<MetricRow>,
    pub leaderboard: Vec<LeaderboardRow>,
    pub stability: Vec<StabilityRow>,
    pub summary: RunSummary,
    pub dataset_version: DatasetVersion,
}

/// Sites from the config, else every dataset site in key order.
pub fn resolve_sites(config: &ExperimentConfig, dataset: &Dataset) -> Vec<String> {
    match &config.sites {
        Some(sites) => sites.clone(),
        None => dataset.keys().cloned().collect(),
    }
}

/// Time bounds of the first site: its first/last timestamp when present,
/// else positional `t0` / `t{len-1}`.
pub fn dataset_time_bounds(sites: &[String], dataset: &Dataset) -> (String, String) {
    let Some(site) = sites.first().and_then(|id| dataset.get(id)) else {
        return ("t0".into(), "t0".into());
    };
    if let Some(ts) = site.timestamps.as_ref().filter(|ts| !ts.is_empty()) {
        let first = ts.first().cloned().unwrap_or_default();
        let last = ts.last().cloned().unwrap_or_default();
        return (first, last);
    }
    ("t0".into(), format!("t{}", site.len().saturating_sub(1)))
}

/// Run one experiment over an in-memory dataset.
pub fn run_experiment(
    config: &ExperimentConfig,
    dataset: &Dataset,
    factory: &dyn ModelFactory,
) -> Result<ExperimentOutcome, RunError> {
    config.validate()?;

    let sites = resolve_sites(config, dataset);
    let templates = expand(&config.models, config.search_seed);
    let sched_config = SchedulerConfig::from_experiment(config);

    info!(
        experiment = %config.name,
        sites = ?sites,
        model_variants = templates.len(),
        tasks = templates.len() * sites.len(),
        workers = sched_config.max_workers,
        "experiment start"
    );

    let schedule = scheduler::run(&templates, &sites, dataset, factory, &sched_config)?;

    let metrics = evaluate(&schedule.predictions);
    let leaderboard = leaderboard::build(&metrics);
    let stability = stability::build(&metrics);

    let (time_start, time_end) = dataset_time_bounds(&sites, dataset);
    let summary = RunSummary {
        experiment: config.name.clone(),
        dataset_version: config.dataset_version.clone(),
        config_fingerprint: config.fingerprint(),
        horizons: config.horizons.clone(),
        sites: sites.clone(),
        models: templates.clone(),
        train_size: config.train_size,
        refit_each_origin: config.refit_each_origin,
        max_workers: sched_config.max_workers,
        model_type_limits: config.model_type_limits.clone(),
        skip_failed_models: config.skip_failed_models,
        task_count: schedule.task_count,
        prediction_count: schedule.predictions.len(),
        failed_models: schedule.failures.clone(),
        time_start: time_start.clone(),
        time_end: time_end.clone(),
        output_dir: None,
        dataset_stats: None,
    };
    let dataset_version = DatasetVersion::new(&config.dataset_version, sites.clone(), time_start, time_end);

    info!(
        experiment = %config.name,
        predictions = schedule.predictions.len(),
        failures = schedule.failures.len(),
        "experiment complete"
    );

    Ok(ExperimentOutcome {
        config: config.clone(),
        templates,
        sites,
        predictions: schedule.predictions,
        failures: schedule.failures,
        metrics,
        leaderboard,
        stability,
        summary,
        dataset_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use windrace_core::{ModelRegistry, Params, SiteData};

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            horizons: vec![1],
            train_size: 5,
            models: vec![ModelConfig::fixed("persistence", Params::new())],
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn concrete_persistence_run() {
        let dataset = Dataset::from([(
            "s1".to_string(),
            SiteData::from_series(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]),
        )]);
        let out = run_experiment(&config(), &dataset, &ModelRegistry::with_builtins()).unwrap();
        assert_eq!(out.predictions.len(), 3);
        assert_eq!(out.metrics[0].mae, 1.0);
        assert_eq!(out.leaderboard.len(), 1);
        assert_eq!(out.summary.time_start, "t0");
        assert_eq!(out.summary.time_end, "t7");
        assert_eq!(out.dataset_version.site_ids, vec!["s1".to_string()]);
    }

    #[test]
    fn empty_horizons_rejected_before_running() {
        let cfg = ExperimentConfig {
            horizons: vec![],
            ..config()
        };
        let err = run_experiment(&cfg, &Dataset::new(), &ModelRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn time_bounds_prefer_timestamps() {
        let dataset = Dataset::from([(
            "s1".to_string(),
            SiteData::from_series(vec![1.0, 2.0])
                .with_timestamps(vec!["2024/1/1 0:00".into(), "2024/1/1 0:15".into()]),
        )]);
        let (start, end) = dataset_time_bounds(&["s1".to_string()], &dataset);
        assert_eq!(start, "2024/1/1 0:00");
        assert_eq!(end, "2024/1/1 0:15");
    }
}
