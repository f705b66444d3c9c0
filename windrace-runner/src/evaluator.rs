//! Evaluator — predictions into segmented error metrics.
//!
//! Every prediction lands in three groups for its (site, model, horizon):
//! `overall/all`, `season/<season>` and `wind_bin/<bin>`. Each group gets MAE,
//! RMSE, nMAE and a sample count.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::walk_forward::PredictionRow;

const NMAE_FLOOR: f64 = 1e-12;

/// Naive datetime formats tried after RFC 3339.
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

// ─── Segments ────────────────────────────────────────────────────────

/// Segment classification. Variant order is the output priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKey {
    Overall,
    Season,
    WindBin,
}

impl SegmentKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overall => "overall",
            Self::Season => "season",
            Self::WindBin => "wind_bin",
        }
    }
}

impl std::fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a timestamp in any of the accepted layouts.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Meteorological season of a timestamp, or "unknown".
pub fn season_of(timestamp: Option<&str>) -> &'static str {
    match timestamp.and_then(parse_timestamp).map(|dt| dt.month()) {
        Some(3..=5) => "spring",
        Some(6..=8) => "summer",
        Some(9..=11) => "autumn",
        Some(_) => "winter",
        None => "unknown",
    }
}

/// Wind-speed bucket: `< 4` low, `< 8` mid, otherwise high.
pub fn wind_bin_of(wind_speed: Option<f64>) -> &'static str {
    match wind_speed {
        Some(ws) if ws.is_nan() => "unknown",
        Some(ws) if ws < 4.0 => "low",
        Some(ws) if ws < 8.0 => "mid",
        Some(_) => "high",
        None => "unknown",
    }
}

pub(crate) fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

// ─── Metrics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub site_id: String,
    pub model_name: String,
    pub horizon: usize,
    pub segment_key: SegmentKey,
    pub segment_value: String,
    #[serde(rename = "MAE")]
    pub mae: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "nMAE")]
    pub nmae: f64,
    pub samples: usize,
}

type GroupKey = (String, String, usize, SegmentKey, String);

/// Compute segmented metrics, sorted by site, segment priority, segment
/// value, horizon, then MAE.
///
/// The result depends only on the multiset of predictions, not their order.
pub fn evaluate(predictions: &[PredictionRow]) -> Vec<MetricRow> {
    let mut groups: BTreeMap<GroupKey, Vec<&PredictionRow>> = BTreeMap::new();
    for row in predictions {
        let segments = [
            (SegmentKey::Overall, "all"),
            (SegmentKey::Season, season_of(row.timestamp.as_deref())),
            (SegmentKey::WindBin, wind_bin_of(row.wind_speed)),
        ];
        for (key, value) in segments {
            groups
                .entry((
                    row.site_id.clone(),
                    row.model_name.clone(),
                    row.horizon,
                    key,
                    value.to_string(),
                ))
                .or_default()
                .push(row);
        }
    }

    let mut metrics: Vec<MetricRow> = groups
        .into_iter()
        .map(|((site_id, model_name, horizon, segment_key, segment_value), mut rows)| {
            // Fixed summation order regardless of input order.
            rows.sort_by(|a, b| {
                a.origin_index
                    .cmp(&b.origin_index)
                    .then(a.y_true.total_cmp(&b.y_true))
                    .then(a.y_pred.total_cmp(&b.y_pred))
            });
            let (mae, rmse, nmae) = error_metrics(&rows);
            MetricRow {
                site_id,
                model_name,
                horizon,
                segment_key,
                segment_value,
                mae: round6(mae),
                rmse: round6(rmse),
                nmae: round6(nmae),
                samples: rows.len(),
            }
        })
        .collect();

    metrics.sort_by(|a, b| {
        a.site_id
            .cmp(&b.site_id)
            .then(a.segment_key.cmp(&b.segment_key))
            .then(a.segment_value.cmp(&b.segment_value))
            .then(a.horizon.cmp(&b.horizon))
            .then(a.mae.total_cmp(&b.mae))
    });
    metrics
}

fn error_metrics(rows: &[&PredictionRow]) -> (f64, f64, f64) {
    let n = rows.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut truth_sum = 0.0;
    for row in rows {
        let err = row.y_true - row.y_pred;
        abs_sum += err.abs();
        sq_sum += err * err;
        truth_sum += row.y_true.abs();
    }
    (abs_sum / n, (sq_sum / n).sqrt(), abs_sum / truth_sum.max(NMAE_FLOOR))
}
