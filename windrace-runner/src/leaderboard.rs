//! Leaderboard — mean error per (site, model), ranked by average MAE.
//!
//! Averages over every metric row it is handed. The orchestrator passes all
//! segments (overall, season and wind-bin rows alike), so each average mixes
//! the three segment families. `build_overall` restricts the input to the
//! `overall/all` rows for callers that want per-horizon averages only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::evaluator::{round6, MetricRow, SegmentKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub site_id: String,
    pub model_name: String,
    #[serde(rename = "avg_MAE")]
    pub avg_mae: f64,
    #[serde(rename = "avg_RMSE")]
    pub avg_rmse: f64,
}

/// Rank (site, model) pairs by mean MAE over the supplied rows.
///
/// Output is sorted by site, then `avg_MAE` ascending; ties keep model-name
/// order.
pub fn build(metrics: &[MetricRow]) -> Vec<LeaderboardRow> {
    let mut agg: BTreeMap<(&str, &str), (f64, f64, usize)> = BTreeMap::new();
    for row in metrics {
        let entry = agg
            .entry((row.site_id.as_str(), row.model_name.as_str()))
            .or_insert((0.0, 0.0, 0));
        entry.0 += row.mae;
        entry.1 += row.rmse;
        entry.2 += 1;
    }

    let mut board: Vec<LeaderboardRow> = agg
        .into_iter()
        .map(|((site_id, model_name), (mae_sum, rmse_sum, count))| {
            let c = count.max(1) as f64;
            LeaderboardRow {
                site_id: site_id.to_string(),
                model_name: model_name.to_string(),
                avg_mae: round6(mae_sum / c),
                avg_rmse: round6(rmse_sum / c),
            }
        })
        .collect();

    board.sort_by(|a, b| a.site_id.cmp(&b.site_id).then(a.avg_mae.total_cmp(&b.avg_mae)));
    board
}

/// Same ranking, computed over `overall/all` rows only.
pub fn build_overall(metrics: &[MetricRow]) -> Vec<LeaderboardRow> {
    let overall: Vec<MetricRow> = metrics
        .iter()
        .filter(|m| m.segment_key == SegmentKey::Overall && m.segment_value == "all")
        .cloned()
        .collect();
    build(&overall)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(site: &str, model: &str, key: SegmentKey, value: &str, mae: f64) -> MetricRow {
        MetricRow {
            site_id: site.into(),
            model_name: model.into(),
            horizon: 1,
            segment_key: key,
            segment_value: value.into(),
            mae,
            rmse: mae * 2.0,
            nmae: 0.0,
            samples: 1,
        }
    }

    #[test]
    fn averages_and_ranks_per_site() {
        let rows = vec![
            metric("s2", "a", SegmentKey::Overall, "all", 0.5),
            metric("s1", "b", SegmentKey::Overall, "all", 0.2),
            metric("s1", "a", SegmentKey::Overall, "all", 0.4),
            metric("s1", "b", SegmentKey::Overall, "all", 0.4),
        ];
        let board = build(&rows);
        let order: Vec<(&str, &str, f64)> = board
            .iter()
            .map(|r| (r.site_id.as_str(), r.model_name.as_str(), r.avg_mae))
            .collect();
        assert_eq!(order, vec![("s1", "b", 0.3), ("s1", "a", 0.4), ("s2", "a", 0.5)]);
        assert_eq!(board[0].avg_rmse, 0.6);
    }

    #[test]
    fn mixes_every_segment_it_is_given() {
        let rows = vec![
            metric("s1", "a", SegmentKey::Overall, "all", 1.0),
            metric("s1", "a", SegmentKey::Season, "summer", 4.0),
            metric("s1", "a", SegmentKey::WindBin, "high", 7.0),
        ];
        assert_eq!(build(&rows)[0].avg_mae, 4.0);
        assert_eq!(build_overall(&rows)[0].avg_mae, 1.0);
    }

    #[test]
    fn ties_keep_model_order() {
        let rows = vec![
            metric("s1", "zeta", SegmentKey::Overall, "all", 0.1),
            metric("s1", "alpha", SegmentKey::Overall, "all", 0.1),
        ];
        let names: Vec<String> = build(&rows).into_iter().map(|r| r.model_name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
