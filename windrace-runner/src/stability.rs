//! Stability ranking — how consistent a model's error is across horizons.
//!
//! Only `overall/all` metric rows are used; season and wind-bin rows carry
//! error magnitudes on different sample subsets and would distort the spread.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::evaluator::{round6, MetricRow, SegmentKey};

const CV_MEAN_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityRow {
    pub site_id: String,
    pub model_name: String,
    #[serde(rename = "mean_MAE")]
    pub mean_mae: f64,
    #[serde(rename = "std_MAE")]
    pub std_mae: f64,
    #[serde(rename = "cv_MAE")]
    pub cv_mae: f64,
    #[serde(rename = "mean_RMSE")]
    pub mean_rmse: f64,
    #[serde(rename = "mean_nMAE")]
    pub mean_nmae: f64,
    pub horizon_count: usize,
}

fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return 0.0;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

/// Population standard deviation; 0 for fewer than two values.
fn std_dev(vals: &[f64]) -> f64 {
    if vals.len() <= 1 {
        return 0.0;
    }
    let m = mean(vals);
    let var = vals.iter().map(|v| (v - m).powi(2)).sum::<f64>() / vals.len() as f64;
    var.sqrt()
}

#[derive(Default)]
struct Samples {
    mae: Vec<f64>,
    rmse: Vec<f64>,
    nmae: Vec<f64>,
}

/// Rank (site, model) pairs by coefficient of variation of MAE across
/// horizons. Sorted by site, `cv_MAE`, then `mean_MAE`.
pub fn build(metrics: &[MetricRow]) -> Vec<StabilityRow> {
    let mut grouped: BTreeMap<(&str, &str), Samples> = BTreeMap::new();
    for row in metrics
        .iter()
        .filter(|m| m.segment_key == SegmentKey::Overall && m.segment_value == "all")
    {
        let s = grouped
            .entry((row.site_id.as_str(), row.model_name.as_str()))
            .or_default();
        s.mae.push(row.mae);
        s.rmse.push(row.rmse);
        s.nmae.push(row.nmae);
    }

    let mut rows: Vec<StabilityRow> = grouped
        .into_iter()
        .map(|((site_id, model_name), s)| {
            let mae_mean = mean(&s.mae);
            let mae_std = std_dev(&s.mae);
            let cv = if mae_mean > CV_MEAN_FLOOR {
                mae_std / mae_mean
            } else {
                0.0
            };
            StabilityRow {
                site_id: site_id.to_string(),
                model_name: model_name.to_string(),
                mean_mae: round6(mae_mean),
                std_mae: round6(mae_std),
                cv_mae: round6(cv),
                mean_rmse: round6(mean(&s.rmse)),
                mean_nmae: round6(mean(&s.nmae)),
                horizon_count: s.mae.len(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.site_id
            .cmp(&b.site_id)
            .then(a.cv_mae.total_cmp(&b.cv_mae))
            .then(a.mean_mae.total_cmp(&b.mean_mae))
    });
    rows
}
