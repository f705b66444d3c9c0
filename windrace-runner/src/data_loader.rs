//! Dataset loading for the runner.
//!
//! Two sources:
//! - SCADA + NWP CSV pair: the SCADA file carries the target (total power),
//!   the NWP file carries forecast covariates. Rows are joined on the
//!   timestamp column and ordered by parsed time.
//! - Synthetic demo series: daily cycle + slow trend + bounded noise, one
//!   deterministic seed per site.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use windrace_core::{Dataset, ExogRow, SiteData};

use crate::config::DataSource;
use crate::evaluator::{parse_timestamp, round6};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("empty csv: {0}")]
    Empty(PathBuf),
    #[error("{path}: missing column '{column}'")]
    MissingColumn { path: PathBuf, column: String },
    #[error("no aligned timestamps between scada and nwp csv")]
    NoAlignedTimestamps,
    #[error("no valid target values in column '{0}'")]
    NoValidTargets(String),
}

/// Options for `load_scada_nwp_series`.
#[derive(Debug, Clone)]
pub struct CsvLoadOptions {
    pub site_id: String,
    pub target_col: String,
    pub timestamp_col: String,
    pub max_rows: Option<usize>,
    /// Keep only these NWP columns as covariates.
    pub feature_cols: Option<Vec<String>>,
}

impl Default for CsvLoadOptions {
    fn default() -> Self {
        Self {
            site_id: "site_real_01".into(),
            target_col: "Total_Power".into(),
            timestamp_col: "Timestamp".into(),
            max_rows: None,
            feature_cols: None,
        }
    }
}

/// Row accounting and target profile of a CSV load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvStats {
    pub target_col: String,
    pub timestamp_col: String,
    pub rows_scada: usize,
    pub rows_nwp: usize,
    pub rows_aligned: usize,
    pub rows_final: usize,
    pub rows_dropped_target_parse: usize,
    pub n_exog_features: usize,
    pub feature_cols: Vec<String>,
    pub target_min: f64,
    pub target_max: f64,
    pub target_mean: f64,
    pub time_start: String,
    pub time_end: String,
}

/// Dataset profile written alongside run artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub source: DataSource,
    pub sites: Vec<String>,
    pub series_length: usize,
    /// BLAKE3 over site ids and series values, in site order.
    pub dataset_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<CsvStats>,
}

// ─── CSV ─────────────────────────────────────────────────────────────

struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

fn read_table(path: &Path) -> Result<CsvTable, LoadError> {
    let wrap = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(wrap)?;
    let headers: Vec<String> = rdr
        .headers()
        .map_err(wrap)?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(wrap)?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }
    if rows.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    Ok(CsvTable { headers, rows })
}

fn require_column(table: &CsvTable, path: &Path, column: &str) -> Result<usize, LoadError> {
    table.column(column).ok_or_else(|| LoadError::MissingColumn {
        path: path.to_path_buf(),
        column: column.to_string(),
    })
}

/// Last row wins when a timestamp repeats.
fn index_by_timestamp(table: &CsvTable, ts_idx: usize) -> HashMap<String, usize> {
    let mut by_ts = HashMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        if let Some(ts) = row.get(ts_idx).map(|s| s.trim()).filter(|s| !s.is_empty()) {
            by_ts.insert(ts.to_string(), i);
        }
    }
    by_ts
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Load one site from a SCADA/NWP CSV pair.
pub fn load_scada_nwp_series(
    scada_csv: &Path,
    nwp_csv: &Path,
    opts: &CsvLoadOptions,
) -> Result<(SiteData, CsvStats), LoadError> {
    let scada = read_table(scada_csv)?;
    let nwp = read_table(nwp_csv)?;

    let scada_ts = require_column(&scada, scada_csv, &opts.timestamp_col)?;
    let target_idx = require_column(&scada, scada_csv, &opts.target_col)?;
    let nwp_ts = require_column(&nwp, nwp_csv, &opts.timestamp_col)?;

    let scada_by_ts = index_by_timestamp(&scada, scada_ts);
    let nwp_by_ts = index_by_timestamp(&nwp, nwp_ts);

    let mut common: Vec<&String> = scada_by_ts.keys().filter(|ts| nwp_by_ts.contains_key(*ts)).collect();
    common.sort_by(|a, b| match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
    if let Some(max_rows) = opts.max_rows {
        common.truncate(max_rows);
    }
    if common.is_empty() {
        return Err(LoadError::NoAlignedTimestamps);
    }

    let wanted: Option<BTreeSet<&str>> = opts
        .feature_cols
        .as_ref()
        .filter(|cols| !cols.is_empty())
        .map(|cols| cols.iter().map(|c| c.as_str()).collect());

    let mut series = Vec::with_capacity(common.len());
    let mut timestamps = Vec::with_capacity(common.len());
    let mut exog = Vec::with_capacity(common.len());
    let mut dropped = 0usize;
    let mut feature_cols: Vec<String> = Vec::new();

    for ts in &common {
        let scada_row = &scada.rows[scada_by_ts[*ts]];
        let Some(y) = scada_row.get(target_idx).and_then(|v| parse_float(v)) else {
            dropped += 1;
            continue;
        };

        let nwp_row = &nwp.rows[nwp_by_ts[*ts]];
        let mut ex = ExogRow::new();
        for (col_idx, header) in nwp.headers.iter().enumerate() {
            if col_idx == nwp_ts || wanted.as_ref().is_some_and(|w| !w.contains(header.as_str())) {
                continue;
            }
            if let Some(v) = nwp_row.get(col_idx).and_then(|v| parse_float(v)) {
                ex.insert(header.clone(), v);
            }
        }
        if feature_cols.is_empty() && !ex.is_empty() {
            feature_cols = ex.keys().cloned().collect();
        }

        series.push(y);
        timestamps.push((*ts).clone());
        exog.push(ex);
    }

    if series.is_empty() {
        return Err(LoadError::NoValidTargets(opts.target_col.clone()));
    }

    let min = series.iter().copied().fold(f64::INFINITY, f64::min);
    let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = series.iter().sum::<f64>() / series.len() as f64;

    let stats = CsvStats {
        target_col: opts.target_col.clone(),
        timestamp_col: opts.timestamp_col.clone(),
        rows_scada: scada.rows.len(),
        rows_nwp: nwp.rows.len(),
        rows_aligned: common.len(),
        rows_final: series.len(),
        rows_dropped_target_parse: dropped,
        n_exog_features: feature_cols.len(),
        feature_cols,
        target_min: round6(min),
        target_max: round6(max),
        target_mean: round6(mean),
        time_start: timestamps.first().cloned().unwrap_or_default(),
        time_end: timestamps.last().cloned().unwrap_or_default(),
    };

    let site = SiteData::from_series(series)
        .with_exog(exog)
        .with_timestamps(timestamps);
    Ok((site, stats))
}

// ─── Synthetic ───────────────────────────────────────────────────────

/// One synthetic capacity-factor series in `[0, 1]`.
pub fn generate_site_series(length: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..length)
        .map(|t| {
            let phase = 2.0 * std::f64::consts::PI * (t % 24) as f64 / 24.0;
            let seasonal = 0.5 + 0.35 * phase.sin();
            let trend = 0.0008 * t as f64;
            let noise: f64 = rng.gen_range(-0.06..0.06);
            round6((seasonal + trend + noise).clamp(0.0, 1.0))
        })
        .collect()
}

/// Demo dataset: site `i` is seeded with `1000 + 17 * i`.
pub fn synthetic_dataset(sites: &[String], length: usize) -> Dataset {
    sites
        .iter()
        .enumerate()
        .map(|(i, site_id)| {
            let series = generate_site_series(length, 1000 + 17 * i as u64);
            (site_id.clone(), SiteData::from_series(series))
        })
        .collect()
}

/// BLAKE3 over site ids and series values in the given site order.
pub fn compute_dataset_hash(sites: &[String], dataset: &Dataset) -> String {
    let mut hasher = blake3::Hasher::new();
    for site_id in sites {
        hasher.update(site_id.as_bytes());
        if let Some(site) = dataset.get(site_id) {
            for v in &site.series {
                hasher.update(&v.to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

impl DatasetStats {
    pub fn synthetic(sites: &[String], length: usize, dataset: &Dataset) -> Self {
        Self {
            source: DataSource::Synthetic,
            sites: sites.to_vec(),
            series_length: length,
            dataset_hash: compute_dataset_hash(sites, dataset),
            csv: None,
        }
    }

    pub fn from_csv(site_id: &str, dataset: &Dataset, csv: CsvStats) -> Self {
        let sites = vec![site_id.to_string()];
        Self {
            source: DataSource::Csv,
            series_length: csv.rows_final,
            dataset_hash: compute_dataset_hash(&sites, dataset),
            sites,
            csv: Some(csv),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn joins_on_timestamp_and_sorts_by_time() {
        let dir = tempfile::tempdir().unwrap();
        let scada = write_csv(
            dir.path(),
            "scada.csv",
            "Timestamp,Total_Power\n2023/1/1 0:30,3.0\n2023/1/1 0:00,1.0\n2023/1/1 0:15,bad\n2023/1/1 0:45,4.0\n",
        );
        let nwp = write_csv(
            dir.path(),
            "nwp.csv",
            "Timestamp,wind_speed,direction,note\n2023/1/1 0:00,5.5,180,x\n2023/1/1 0:15,6.0,185,x\n2023/1/1 0:30,7.5,190,x\n",
        );

        let (site, stats) = load_scada_nwp_series(&scada, &nwp, &CsvLoadOptions::default()).unwrap();
        assert_eq!(site.series, vec![1.0, 3.0]);
        assert_eq!(
            site.timestamps.as_deref().unwrap(),
            &["2023/1/1 0:00".to_string(), "2023/1/1 0:30".to_string()]
        );
        let exog = site.exog.as_ref().unwrap();
        assert_eq!(exog[1]["wind_speed"], 7.5);
        assert!(!exog[0].contains_key("note"));

        assert_eq!(stats.rows_aligned, 3);
        assert_eq!(stats.rows_final, 2);
        assert_eq!(stats.rows_dropped_target_parse, 1);
        assert_eq!(stats.feature_cols, vec!["direction".to_string(), "wind_speed".to_string()]);
        assert_eq!(stats.target_mean, 2.0);
    }

    #[test]
    fn feature_cols_restrict_covariates() {
        let dir = tempfile::tempdir().unwrap();
        let scada = write_csv(dir.path(), "s.csv", "Timestamp,Total_Power\n2023/1/1 0:00,1.0\n");
        let nwp = write_csv(dir.path(), "n.csv", "Timestamp,wind_speed,direction\n2023/1/1 0:00,5.5,180\n");
        let opts = CsvLoadOptions {
            feature_cols: Some(vec!["wind_speed".into()]),
            ..CsvLoadOptions::default()
        };
        let (site, stats) = load_scada_nwp_series(&scada, &nwp, &opts).unwrap();
        assert_eq!(site.exog.unwrap()[0].keys().collect::<Vec<_>>(), vec!["wind_speed"]);
        assert_eq!(stats.n_exog_features, 1);
    }

    #[test]
    fn no_overlap_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let scada = write_csv(dir.path(), "s.csv", "Timestamp,Total_Power\n2023/1/1 0:00,1.0\n");
        let nwp = write_csv(dir.path(), "n.csv", "Timestamp,wind_speed\n2023/1/2 0:00,5.5\n");
        let err = load_scada_nwp_series(&scada, &nwp, &CsvLoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::NoAlignedTimestamps));
    }

    #[test]
    fn missing_target_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let scada = write_csv(dir.path(), "s.csv", "Timestamp,Power\n2023/1/1 0:00,1.0\n");
        let nwp = write_csv(dir.path(), "n.csv", "Timestamp,wind_speed\n2023/1/1 0:00,5.5\n");
        let err = load_scada_nwp_series(&scada, &nwp, &CsvLoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { ref column, .. } if column == "Total_Power"));
    }

    #[test]
    fn synthetic_data_is_deterministic_and_bounded() {
        let sites = vec!["site_a".to_string(), "site_b".to_string()];
        let a = synthetic_dataset(&sites, 96);
        let b = synthetic_dataset(&sites, 96);
        assert_eq!(a, b);
        assert_ne!(a["site_a"].series, a["site_b"].series);
        assert!(a["site_a"].series.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(
            compute_dataset_hash(&sites, &a),
            compute_dataset_hash(&sites, &b)
        );
    }
}
