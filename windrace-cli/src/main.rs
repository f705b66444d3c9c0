//! WindRace CLI — run and inspect forecasting experiments.
//!
//! Commands:
//! - `run` — execute an experiment from a TOML config and save artifacts
//! - `expand` — print the model variants a config expands to

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use windrace_core::{Dataset, LeastSquaresProvider, ModelRegistry};
use windrace_runner::{
    expand, load_scada_nwp_series, run_experiment, save_run_artifacts, synthetic_dataset,
    CsvLoadOptions, DataConfig, DataSource, DatasetRegistry, DatasetStats, ExperimentConfig,
    ExperimentOutcome,
};

const DEFAULT_SYNTHETIC_SITES: [&str; 2] = ["site_a", "site_b"];
const DEFAULT_CSV_SITE: &str = "site_real_01";

#[derive(Parser)]
#[command(
    name = "windrace",
    about = "WindRace CLI — wind-power forecasting model benchmarks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment and write its artifacts.
    Run {
        /// Path to a TOML experiment config.
        #[arg(long)]
        config: PathBuf,

        /// Root directory for run artifacts.
        #[arg(long, default_value = "outputs/runs")]
        output_dir: PathBuf,

        /// Override `max_workers` from the config.
        #[arg(long)]
        max_workers: Option<usize>,

        /// Back the tabular models with the least-squares reference estimator.
        #[arg(long, default_value_t = false)]
        reference_estimators: bool,
    },
    /// Print the expanded model variants as JSON.
    Expand {
        /// Path to a TOML experiment config.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            max_workers,
            reference_estimators,
        } => run_cmd(&config, &output_dir, max_workers, reference_estimators),
        Commands::Expand { config } => expand_cmd(&config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("windrace=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run_cmd(
    config_path: &Path,
    output_dir: &Path,
    max_workers: Option<usize>,
    reference_estimators: bool,
) -> Result<()> {
    let mut config = ExperimentConfig::from_file(config_path)?;
    if let Some(n) = max_workers {
        config.max_workers = n;
    }

    let (dataset, stats) = build_dataset(&mut config)?;

    let mut factory = ModelRegistry::with_builtins();
    if reference_estimators {
        factory = factory.with_estimator_for_all(Arc::new(LeastSquaresProvider));
    }

    let outcome = run_experiment(&config, &dataset, &factory)?;
    let run_dir = save_run_artifacts(&outcome, Some(&stats), output_dir)?;

    let registry = DatasetRegistry::new(output_dir.join("dataset_registry.json"));
    registry.register(&outcome.dataset_version)?;
    info!(path = %registry.path().display(), "dataset version registered");

    print_summary(&outcome);
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

/// Build the dataset the `[data]` table describes. Pins `config.sites` to
/// the sites actually built so the run summary lists them explicitly.
fn build_dataset(config: &mut ExperimentConfig) -> Result<(Dataset, DatasetStats)> {
    let data = config.data.clone().unwrap_or_default();
    match data.source {
        DataSource::Synthetic => {
            let sites = config
                .sites
                .clone()
                .unwrap_or_else(|| DEFAULT_SYNTHETIC_SITES.iter().map(|s| s.to_string()).collect());
            let dataset = synthetic_dataset(&sites, data.series_length);
            let stats = DatasetStats::synthetic(&sites, data.series_length, &dataset);
            config.sites = Some(sites);
            Ok((dataset, stats))
        }
        DataSource::Csv => {
            let site_id = config
                .sites
                .as_ref()
                .and_then(|s| s.first().cloned())
                .unwrap_or_else(|| DEFAULT_CSV_SITE.to_string());
            let (scada, nwp) = csv_paths(&data)?;
            let opts = CsvLoadOptions {
                site_id: site_id.clone(),
                target_col: data.target_col.clone(),
                timestamp_col: data.timestamp_col.clone(),
                max_rows: data.max_rows,
                feature_cols: data.feature_cols.clone(),
            };
            let (site, csv_stats) = load_scada_nwp_series(scada, nwp, &opts)
                .with_context(|| format!("failed to load site {site_id}"))?;
            let dataset = Dataset::from([(site_id.clone(), site)]);
            let stats = DatasetStats::from_csv(&site_id, &dataset, csv_stats);
            config.sites = Some(vec![site_id]);
            Ok((dataset, stats))
        }
    }
}

fn csv_paths(data: &DataConfig) -> Result<(&Path, &Path)> {
    match (&data.scada_csv, &data.nwp_csv) {
        (Some(scada), Some(nwp)) => Ok((scada.as_path(), nwp.as_path())),
        _ => bail!("[data] source = \"csv\" requires both scada_csv and nwp_csv"),
    }
}

fn expand_cmd(config_path: &Path) -> Result<()> {
    let config = ExperimentConfig::from_file(config_path)?;
    let templates = expand(&config.models, config.search_seed);
    println!("{}", serde_json::to_string_pretty(&templates)?);
    Ok(())
}

fn print_summary(outcome: &ExperimentOutcome) {
    let s = &outcome.summary;
    println!();
    println!("=== Experiment Result ===");
    println!("Experiment:     {}", s.experiment);
    println!("Dataset:        {}", s.dataset_version);
    println!("Sites:          {}", s.sites.join(", "));
    println!("Period:         {} to {}", s.time_start, s.time_end);
    println!("Tasks:          {}", s.task_count);
    println!("Predictions:    {}", s.prediction_count);
    println!("Failed:         {}", s.failed_models.len());
    println!();
    println!("--- Leaderboard ---");
    println!("{:<14} {:<40} {:>10} {:>10}", "Site", "Model", "avg MAE", "avg RMSE");
    println!("{}", "-".repeat(77));
    for row in outcome.leaderboard.iter().take(10) {
        println!(
            "{:<14} {:<40} {:>10.6} {:>10.6}",
            row.site_id, row.model_name, row.avg_mae, row.avg_rmse
        );
    }
    for f in &s.failed_models {
        println!("WARNING: {} failed on {}: {}", f.model_label, f.site_id, f.error);
    }
    println!();
}
