//! WindRace Runner — experiment orchestration for wind-power forecasting.
//!
//! This crate builds on `windrace-core` to provide:
//! - TOML experiment config with validation and fingerprinting
//! - Model spec expansion (fixed, grid and seeded random search)
//! - Walk-forward backtesting without lookahead
//! - A task scheduler with global and per-category concurrency limits
//! - Segmented evaluation (overall, season, wind-speed bin)
//! - Accuracy and stability leaderboards
//! - SCADA/NWP CSV loading, synthetic demo data and a dataset registry
//! - CSV/JSON/Markdown run artifacts

pub mod config;
pub mod data_loader;
pub mod evaluator;
pub mod expander;
pub mod export;
pub mod leaderboard;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod stability;
pub mod walk_forward;

pub use config::{ConfigError, DataConfig, DataSource, ExperimentConfig, ModelConfig, SearchMethod, SearchSpec};
pub use data_loader::{
    load_scada_nwp_series, synthetic_dataset, CsvLoadOptions, CsvStats, DatasetStats, LoadError,
};
pub use evaluator::{evaluate, MetricRow, SegmentKey};
pub use expander::{expand, format_model_label, TaskTemplate};
pub use export::{build_markdown_report, load_run_summary, save_run_artifacts};
pub use leaderboard::LeaderboardRow;
pub use orchestrator::{run_experiment, ExperimentOutcome, RunSummary};
pub use registry::{DatasetRegistry, DatasetVersion};
pub use scheduler::{AdmissionStats, FailureRecord, RunError, ScheduleOutcome, SchedulerConfig};
pub use stability::StabilityRow;
pub use walk_forward::{backtest, BacktestError, PredictionRow, WalkForwardConfig};
