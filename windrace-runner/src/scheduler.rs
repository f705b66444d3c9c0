//! Task scheduler — templates × sites under two-level admission control.
//!
//! Every (template, site) pair is an independent task. With `max_workers <= 1`
//! tasks run one after another on the caller's thread. Otherwise they run on a
//! dedicated Rayon pool of `max_workers` threads, and each task additionally
//! holds a slot of its model category (`boost`, `forest`, `nn`, `linear`,
//! `baseline`) while it runs. A pool worker that picks up a task whose category
//! is full blocks until a slot of that category frees up; the global count and
//! the category count are checked and incremented together under one lock.
//!
//! Results are collected with their task index and sorted before returning, so
//! the outcome does not depend on completion order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use windrace_core::{Dataset, ModelCategory, ModelError, ModelFactory, SiteData};

use crate::config::{ConfigError, ExperimentConfig};
use crate::expander::TaskTemplate;
use crate::walk_forward::{backtest, BacktestError, PredictionRow, WalkForwardConfig};

// ─── Error type ──────────────────────────────────────────────────────

/// Errors that terminate a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("model {model_label} failed on site {site_id}: {source}")]
    Task {
        model_label: String,
        site_id: String,
        #[source]
        source: ModelError,
    },
    #[error("no successful model predictions generated ({failed} task(s) failed); check estimators and configs")]
    NoPredictions { failed: usize },
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

// ─── Configuration / results ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub walk_forward: WalkForwardConfig,
    pub max_workers: usize,
    /// Per-category admission limits (each ≥ 1).
    pub category_limits: BTreeMap<ModelCategory, usize>,
    pub skip_failed_models: bool,
}

impl SchedulerConfig {
    pub fn from_experiment(config: &ExperimentConfig) -> Self {
        Self {
            walk_forward: WalkForwardConfig {
                horizons: config.horizons.clone(),
                train_size: config.train_size,
                refit_each_origin: config.refit_each_origin,
            },
            max_workers: config.effective_max_workers(),
            category_limits: ModelCategory::ALL
                .iter()
                .map(|&cat| (cat, config.category_limit(cat)))
                .collect(),
            skip_failed_models: config.skip_failed_models,
        }
    }

    fn limit_for(&self, category: ModelCategory) -> usize {
        self.category_limits
            .get(&category)
            .copied()
            .unwrap_or(self.max_workers)
            .max(1)
    }
}

/// A task that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub model_name: String,
    pub model_label: String,
    pub site_id: String,
    pub error: String,
}

/// Highest number of simultaneously running tasks observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStats {
    pub peak_running: usize,
    pub peak_by_category: BTreeMap<ModelCategory, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    /// Predictions in task order (template-major, then site), each task's
    /// rows in backtest order.
    pub predictions: Vec<PredictionRow>,
    /// Skipped failures in task order.
    pub failures: Vec<FailureRecord>,
    pub task_count: usize,
    pub admission: AdmissionStats,
}

/// One (template, site) pair.
#[derive(Debug, Clone, Copy)]
pub struct Task<'a> {
    pub index: usize,
    pub template: &'a TaskTemplate,
    pub site_id: &'a str,
    pub site: &'a SiteData,
}

// ─── Task construction ───────────────────────────────────────────────

/// Cross product `templates × sites`, template-major.
///
/// Fails upfront on unknown sites or covariates/timestamps whose length does
/// not match the series.
pub fn build_tasks<'a>(
    templates: &'a [TaskTemplate],
    sites: &'a [String],
    dataset: &'a Dataset,
) -> Result<Vec<Task<'a>>, ConfigError> {
    let mut resolved = Vec::with_capacity(sites.len());
    for site_id in sites {
        let site = dataset
            .get(site_id)
            .ok_or_else(|| ConfigError::UnknownSite(site_id.clone()))?;
        check_alignment(site_id, site)?;
        resolved.push((site_id.as_str(), site));
    }

    let mut tasks = Vec::with_capacity(templates.len() * resolved.len());
    for template in templates {
        for &(site_id, site) in &resolved {
            tasks.push(Task {
                index: tasks.len(),
                template,
                site_id,
                site,
            });
        }
    }
    Ok(tasks)
}

fn check_alignment(site_id: &str, site: &SiteData) -> Result<(), ConfigError> {
    let misaligned = |field: &'static str, actual: usize| ConfigError::Misaligned {
        site_id: site_id.to_string(),
        field,
        expected: site.len(),
        actual,
    };
    if !site.exog_aligned() {
        let actual = site.exog.as_ref().map_or(0, Vec::len);
        return Err(misaligned("exog", actual));
    }
    if !site.timestamps_aligned() {
        let actual = site.timestamps.as_ref().map_or(0, Vec::len);
        return Err(misaligned("timestamps", actual));
    }
    Ok(())
}

// ─── Admission control ───────────────────────────────────────────────

#[derive(Default)]
struct AdmissionState {
    running: usize,
    per_category: BTreeMap<ModelCategory, usize>,
    stats: AdmissionStats,
}

/// Global + per-category counting semaphore, acquired as a pair.
struct AdmissionControl {
    total_limit: usize,
    limits: BTreeMap<ModelCategory, usize>,
    state: Mutex<AdmissionState>,
    freed: Condvar,
}

/// Held while a task runs; releases both slots on drop.
struct Permit<'a> {
    control: &'a AdmissionControl,
    category: ModelCategory,
}

impl AdmissionControl {
    fn new(config: &SchedulerConfig) -> Self {
        Self {
            total_limit: config.max_workers.max(1),
            limits: ModelCategory::ALL
                .iter()
                .map(|&cat| (cat, config.limit_for(cat)))
                .collect(),
            state: Mutex::new(AdmissionState::default()),
            freed: Condvar::new(),
        }
    }

    fn acquire(&self, category: ModelCategory) -> Permit<'_> {
        let limit = self.limits.get(&category).copied().unwrap_or(self.total_limit);
        let mut state = self.state.lock();
        loop {
            let in_category = state.per_category.get(&category).copied().unwrap_or(0);
            if state.running < self.total_limit && in_category < limit {
                break;
            }
            self.freed.wait(&mut state);
        }

        let st = &mut *state;
        st.running += 1;
        let slot = st.per_category.entry(category).or_insert(0);
        *slot += 1;
        st.stats.peak_running = st.stats.peak_running.max(st.running);
        let peak = st.stats.peak_by_category.entry(category).or_insert(0);
        *peak = (*peak).max(*slot);

        Permit {
            control: self,
            category,
        }
    }

    fn stats(&self) -> AdmissionStats {
        self.state.lock().stats.clone()
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.control.state.lock();
        state.running = state.running.saturating_sub(1);
        if let Some(slot) = state.per_category.get_mut(&self.category) {
            *slot = slot.saturating_sub(1);
        }
        drop(state);
        self.control.freed.notify_all();
    }
}

// ─── Execution ───────────────────────────────────────────────────────

/// Construct the model and run the walk-forward loop for one task.
fn run_task(
    task: &Task<'_>,
    factory: &dyn ModelFactory,
    walk_forward: &WalkForwardConfig,
) -> Result<Vec<PredictionRow>, BacktestError> {
    let mut model = factory.create(&task.template.model_name, &task.template.params)?;
    backtest(
        task.site_id,
        task.site,
        model.as_mut(),
        &task.template.label,
        walk_forward,
    )
}

enum TaskFailure {
    Fatal(RunError),
    Skipped(FailureRecord),
}

fn classify_failure(task: &Task<'_>, err: BacktestError, skip: bool) -> TaskFailure {
    match err {
        BacktestError::Config(e) => TaskFailure::Fatal(RunError::Config(e)),
        BacktestError::Model(source) if !skip => TaskFailure::Fatal(RunError::Task {
            model_label: task.template.label.clone(),
            site_id: task.site_id.to_string(),
            source,
        }),
        BacktestError::Model(source) => {
            warn!(
                model_label = %task.template.label,
                site_id = %task.site_id,
                error = %source,
                "skip model {} on site {}",
                task.template.label,
                task.site_id
            );
            TaskFailure::Skipped(FailureRecord {
                model_name: task.template.model_name.clone(),
                model_label: task.template.label.clone(),
                site_id: task.site_id.to_string(),
                error: source.to_string(),
            })
        }
    }
}

/// Run every task and aggregate predictions and skipped failures.
///
/// Fails with the first observed fatal error when `skip_failed_models` is
/// off, and with `NoPredictions` when no task produced a single row.
pub fn run(
    templates: &[TaskTemplate],
    sites: &[String],
    dataset: &Dataset,
    factory: &dyn ModelFactory,
    config: &SchedulerConfig,
) -> Result<ScheduleOutcome, RunError> {
    let tasks = build_tasks(templates, sites, dataset)?;
    let outcome = if config.max_workers <= 1 {
        run_sequential(&tasks, factory, config)?
    } else {
        run_concurrent(&tasks, factory, config)?
    };

    if outcome.predictions.is_empty() {
        return Err(RunError::NoPredictions {
            failed: outcome.failures.len(),
        });
    }
    Ok(outcome)
}

fn run_sequential(
    tasks: &[Task<'_>],
    factory: &dyn ModelFactory,
    config: &SchedulerConfig,
) -> Result<ScheduleOutcome, RunError> {
    let mut outcome = ScheduleOutcome {
        task_count: tasks.len(),
        ..ScheduleOutcome::default()
    };

    for task in tasks {
        debug!(site_id = %task.site_id, model_label = %task.template.label, "task start");
        outcome.admission.peak_running = 1;
        outcome
            .admission
            .peak_by_category
            .insert(task.template.category, 1);

        match run_task(task, factory, &config.walk_forward) {
            Ok(rows) => {
                debug!(site_id = %task.site_id, model_label = %task.template.label, rows = rows.len(), "task done");
                outcome.predictions.extend(rows);
            }
            Err(err) => match classify_failure(task, err, config.skip_failed_models) {
                TaskFailure::Fatal(e) => return Err(e),
                TaskFailure::Skipped(record) => outcome.failures.push(record),
            },
        }
    }
    Ok(outcome)
}

fn run_concurrent(
    tasks: &[Task<'_>],
    factory: &dyn ModelFactory,
    config: &SchedulerConfig,
) -> Result<ScheduleOutcome, RunError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_workers)
        .thread_name(|i| format!("windrace-worker-{i}"))
        .build()?;

    let admission = AdmissionControl::new(config);
    let aborted = AtomicBool::new(false);
    let first_error: Mutex<Option<RunError>> = Mutex::new(None);
    let completed = AtomicUsize::new(0);
    let predictions: Mutex<Vec<(usize, Vec<PredictionRow>)>> = Mutex::new(Vec::new());
    let failures: Mutex<Vec<(usize, FailureRecord)>> = Mutex::new(Vec::new());

    pool.install(|| {
        tasks.par_iter().for_each(|task| {
            if aborted.load(Ordering::Acquire) {
                return;
            }
            let _permit = admission.acquire(task.template.category);
            if aborted.load(Ordering::Acquire) {
                return;
            }

            debug!(site_id = %task.site_id, model_label = %task.template.label, "task start");
            match run_task(task, factory, &config.walk_forward) {
                Ok(rows) => {
                    debug!(site_id = %task.site_id, model_label = %task.template.label, rows = rows.len(), "task done");
                    predictions.lock().push((task.index, rows));
                }
                Err(err) => match classify_failure(task, err, config.skip_failed_models) {
                    TaskFailure::Fatal(e) => {
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        aborted.store(true, Ordering::Release);
                    }
                    TaskFailure::Skipped(record) => failures.lock().push((task.index, record)),
                },
            }
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(done, total = tasks.len(), "progress");
        });
    });

    if let Some(err) = first_error.into_inner() {
        return Err(err);
    }

    let mut predictions = predictions.into_inner();
    predictions.sort_by_key(|(idx, _)| *idx);
    let mut failures = failures.into_inner();
    failures.sort_by_key(|(idx, _)| *idx);

    Ok(ScheduleOutcome {
        predictions: predictions.into_iter().flat_map(|(_, rows)| rows).collect(),
        failures: failures.into_iter().map(|(_, record)| record).collect(),
        task_count: tasks.len(),
        admission: admission.stats(),
    })
}
