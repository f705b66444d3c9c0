//! Serializable experiment configuration, loaded from TOML.
//!
//! ```toml
//! name = "demo_experiment"
//! horizons = [1, 2, 4]
//! train_size = 120
//! max_workers = 4
//!
//! [model_type_limits]
//! boost = 1
//!
//! [[models]]
//! name = "persistence"
//!
//! [[models]]
//! name = "lightgbm"
//! params_grid = { lags = [8, 12, 16], learning_rate = [0.03, 0.05] }
//! search = { method = "random", max_trials = 3 }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use windrace_core::{ModelCategory, ParamValue, Params};

/// Content-addressed identity of an experiment configuration.
pub type ConfigFingerprint = String;

// ─── Error type ──────────────────────────────────────────────────────

/// Configuration problems detected before any task runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("horizons must not be empty")]
    EmptyHorizons,
    #[error("horizon must be >= 1, got {0}")]
    InvalidHorizon(usize),
    #[error("site '{0}' not found in dataset")]
    UnknownSite(String),
    #[error("site '{site_id}': {field} has {actual} entries but the series has {expected}")]
    Misaligned {
        site_id: String,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ─── Search ──────────────────────────────────────────────────────────

/// How a parameter grid is turned into concrete variants.
///
/// Any method name other than `random` deserializes as `Grid`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Random,
    #[default]
    #[serde(other)]
    Grid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpec {
    #[serde(default)]
    pub method: SearchMethod,
    /// Values ≤ 0 mean "no explicit cap".
    #[serde(default)]
    pub max_trials: i64,
}

impl SearchSpec {
    pub fn grid(max_trials: i64) -> Self {
        Self {
            method: SearchMethod::Grid,
            max_trials,
        }
    }

    pub fn random(max_trials: i64) -> Self {
        Self {
            method: SearchMethod::Random,
            max_trials,
        }
    }

    /// `Some(n)` when an explicit positive cap was configured.
    pub fn trial_cap(&self) -> Option<usize> {
        (self.max_trials > 0).then_some(self.max_trials as usize)
    }
}

// ─── Models ──────────────────────────────────────────────────────────

/// One `[[models]]` entry: fixed params, or a grid plus a search strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_grid: Option<BTreeMap<String, Vec<ParamValue>>>,
    #[serde(default)]
    pub search: SearchSpec,
}

impl ModelConfig {
    pub fn fixed(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
            params_grid: None,
            search: SearchSpec::default(),
        }
    }

    pub fn grid(name: impl Into<String>, grid: BTreeMap<String, Vec<ParamValue>>, search: SearchSpec) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
            params_grid: Some(grid),
            search,
        }
    }

    /// The grid, if present and non-empty. An empty grid counts as absent.
    pub fn active_grid(&self) -> Option<&BTreeMap<String, Vec<ParamValue>>> {
        self.params_grid.as_ref().filter(|g| !g.is_empty())
    }
}

// ─── Data source ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Synthetic,
    Csv,
}

/// Optional `[data]` table telling the CLI where the dataset comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub source: DataSource,
    #[serde(default = "default_series_length")]
    pub series_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scada_csv: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nwp_csv: Option<PathBuf>,
    #[serde(default = "default_target_col")]
    pub target_col: String,
    #[serde(default = "default_timestamp_col")]
    pub timestamp_col: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_cols: Option<Vec<String>>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: DataSource::Synthetic,
            series_length: default_series_length(),
            scada_csv: None,
            nwp_csv: None,
            target_col: default_target_col(),
            timestamp_col: default_timestamp_col(),
            max_rows: None,
            feature_cols: None,
        }
    }
}

fn default_series_length() -> usize {
    240
}
fn default_target_col() -> String {
    "Total_Power".into()
}
fn default_timestamp_col() -> String {
    "Timestamp".into()
}

// ─── Experiment ──────────────────────────────────────────────────────

/// Everything needed to reproduce one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_dataset_version")]
    pub dataset_version: String,
    /// Sites to benchmark, in order. `None` means every dataset site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sites: Option<Vec<String>>,
    #[serde(default = "default_horizons")]
    pub horizons: Vec<usize>,
    #[serde(default = "default_train_size")]
    pub train_size: usize,
    #[serde(default = "default_true")]
    pub refit_each_origin: bool,
    #[serde(default = "default_true")]
    pub skip_failed_models: bool,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Category name (`boost`, `forest`, `nn`, `linear`, `baseline`) → limit.
    #[serde(default)]
    pub model_type_limits: BTreeMap<String, usize>,
    #[serde(default = "default_search_seed")]
    pub search_seed: u64,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataConfig>,
}

fn default_name() -> String {
    "demo_experiment".into()
}
fn default_dataset_version() -> String {
    "demo_dataset_v1".into()
}
fn default_horizons() -> Vec<usize> {
    vec![1, 2, 4]
}
fn default_train_size() -> usize {
    120
}
fn default_true() -> bool {
    true
}
fn default_max_workers() -> usize {
    1
}
fn default_search_seed() -> u64 {
    42
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            dataset_version: default_dataset_version(),
            sites: None,
            horizons: default_horizons(),
            train_size: default_train_size(),
            refit_each_origin: true,
            skip_failed_models: true,
            max_workers: default_max_workers(),
            model_type_limits: BTreeMap::new(),
            search_seed: default_search_seed(),
            models: Vec::new(),
            data: None,
        }
    }
}

impl ExperimentConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_horizons(&self.horizons)
    }

    /// Worker count with the floor of 1 applied.
    pub fn effective_max_workers(&self) -> usize {
        self.max_workers.max(1)
    }

    /// Admission limit for one category: the configured value, else
    /// `max_workers`, never below 1.
    pub fn category_limit(&self, category: ModelCategory) -> usize {
        self.model_type_limits
            .get(category.as_str())
            .copied()
            .unwrap_or(self.max_workers)
            .max(1)
    }

    /// BLAKE3 hash of the canonical JSON form.
    ///
    /// Two configs with identical content share a fingerprint.
    pub fn fingerprint(&self) -> ConfigFingerprint {
        // Plain data with string keys only; serialization cannot fail.
        let json = serde_json::to_vec(self).expect("ExperimentConfig must serialize");
        blake3::hash(&json).to_hex().to_string()
    }
}

pub(crate) fn validate_horizons(horizons: &[usize]) -> Result<(), ConfigError> {
    if horizons.is_empty() {
        return Err(ConfigError::EmptyHorizons);
    }
    if let Some(&bad) = horizons.iter().find(|&&h| h == 0) {
        return Err(ConfigError::InvalidHorizon(bad));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
name = "racecourse"
horizons = [1, 4]
train_size = 48
max_workers = 4
search_seed = 7

[model_type_limits]
boost = 1

[[models]]
name = "persistence"

[[models]]
name = "moving_average"
params = { window = 3 }

[[models]]
name = "lightgbm"
params_grid = { lags = [8, 12], learning_rate = [0.03, 0.05] }
search = { method = "random", max_trials = 3 }

[data]
source = "csv"
scada_csv = "data/scada.csv"
nwp_csv = "data/nwp.csv"
max_rows = 500
"#;

    #[test]
    fn parses_full_config() {
        let cfg = ExperimentConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.name, "racecourse");
        assert_eq!(cfg.horizons, vec![1, 4]);
        assert_eq!(cfg.train_size, 48);
        assert_eq!(cfg.search_seed, 7);
        assert_eq!(cfg.models.len(), 3);
        assert_eq!(cfg.models[1].params.get("window"), Some(&json!(3)));

        let lgbm = &cfg.models[2];
        assert_eq!(lgbm.search.method, SearchMethod::Random);
        assert_eq!(lgbm.search.trial_cap(), Some(3));
        assert_eq!(lgbm.active_grid().unwrap()["lags"], vec![json!(8), json!(12)]);

        let data = cfg.data.unwrap();
        assert_eq!(data.source, DataSource::Csv);
        assert_eq!(data.max_rows, Some(500));
        assert_eq!(data.target_col, "Total_Power");
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let cfg = ExperimentConfig::from_toml("").unwrap();
        assert_eq!(cfg, ExperimentConfig::default());
        assert_eq!(cfg.horizons, vec![1, 2, 4]);
        assert_eq!(cfg.train_size, 120);
        assert!(cfg.refit_each_origin);
        assert!(cfg.skip_failed_models);
        assert_eq!(cfg.search_seed, 42);
    }

    #[test]
    fn unknown_search_method_is_grid() {
        let cfg = ExperimentConfig::from_toml(
            r#"
[[models]]
name = "xgboost"
params_grid = { max_depth = [4, 6] }
search = { method = "bayesian" }
"#,
        )
        .unwrap();
        assert_eq!(cfg.models[0].search.method, SearchMethod::Grid);
    }

    #[test]
    fn category_limits_default_to_max_workers() {
        let cfg = ExperimentConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.category_limit(ModelCategory::Boost), 1);
        assert_eq!(cfg.category_limit(ModelCategory::Baseline), 4);

        let zero = ExperimentConfig {
            max_workers: 0,
            ..ExperimentConfig::default()
        };
        assert_eq!(zero.category_limit(ModelCategory::Linear), 1);
        assert_eq!(zero.effective_max_workers(), 1);
    }

    #[test]
    fn horizon_validation() {
        let mut cfg = ExperimentConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.horizons.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyHorizons)));
        cfg.horizons = vec![1, 0];
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidHorizon(0))));
    }

    #[test]
    fn fingerprint_is_content_addressed() {
        let a = ExperimentConfig::from_toml(SAMPLE).unwrap();
        let b = ExperimentConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let c = ExperimentConfig {
            train_size: 49,
            ..a.clone()
        };
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn shipped_configs_parse() {
        for text in [
            include_str!("../../configs/demo.toml"),
            include_str!("../../configs/scada_nwp.toml"),
        ] {
            let cfg = ExperimentConfig::from_toml(text).unwrap();
            assert!(cfg.validate().is_ok());
            assert!(!cfg.models.is_empty());
            assert!(cfg.data.is_some());
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ExperimentConfig::from_file(Path::new("/nonexistent/windrace.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/windrace.toml"));
    }
}
