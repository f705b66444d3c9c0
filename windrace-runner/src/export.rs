//! Run artifacts — CSV tables, JSON records and a Markdown report.
//!
//! `save_run_artifacts` creates `{experiment}_{timestamp}/` under the output
//! root containing:
//! - `predictions.csv`, `metrics.csv`, `leaderboard.csv`,
//!   `stability_leaderboard.csv`
//! - `run_summary.json` — config echo, counts, failures, output dir
//! - `failed_models.json` — only when some task was skipped
//! - `dataset_profile.json` — only when dataset stats are supplied
//! - `report.md`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::data_loader::DatasetStats;
use crate::evaluator::{MetricRow, SegmentKey};
use crate::orchestrator::{ExperimentOutcome, RunSummary};

const REPORT_TOP_ROWS: usize = 8;
const SEGMENT_TOP_MODELS: usize = 5;

// ─── CSV export ─────────────────────────────────────────────────────

/// Serialize rows as CSV with a header derived from the row type.
pub fn rows_to_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row).context("failed to serialize CSV row")?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    write_file(path, &json)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write the full artifact set for one run. Returns the run directory.
pub fn save_run_artifacts(
    outcome: &ExperimentOutcome,
    dataset_stats: Option<&DatasetStats>,
    out_root: &Path,
) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        outcome.config.name,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = out_root.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write_file(&run_dir.join("predictions.csv"), &rows_to_csv(&outcome.predictions)?)?;
    write_file(&run_dir.join("metrics.csv"), &rows_to_csv(&outcome.metrics)?)?;
    write_file(&run_dir.join("leaderboard.csv"), &rows_to_csv(&outcome.leaderboard)?)?;
    write_file(
        &run_dir.join("stability_leaderboard.csv"),
        &rows_to_csv(&outcome.stability)?,
    )?;

    if !outcome.failures.is_empty() {
        write_json(&run_dir.join("failed_models.json"), &outcome.failures)?;
    }
    if let Some(stats) = dataset_stats {
        write_json(&run_dir.join("dataset_profile.json"), stats)?;
    }

    let mut summary = outcome.summary.clone();
    summary.output_dir = Some(run_dir.clone());
    summary.dataset_stats = dataset_stats.cloned();
    write_json(&run_dir.join("run_summary.json"), &summary)?;

    write_file(
        &run_dir.join("report.md"),
        &build_markdown_report(outcome, dataset_stats),
    )?;

    info!(dir = %run_dir.display(), "run artifacts saved");
    Ok(run_dir)
}

/// Load `run_summary.json` back from a run directory.
pub fn load_run_summary(dir: &Path) -> Result<RunSummary> {
    let path = dir.join("run_summary.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

// ─── Markdown report ────────────────────────────────────────────────

struct SegmentSummary<'a> {
    model_name: &'a str,
    mae: f64,
    rmse: f64,
    nmae: f64,
    samples: usize,
}

/// Per segment value, models ranked by mean MAE over sites and horizons.
fn summarize_segment(metrics: &[MetricRow], key: SegmentKey) -> BTreeMap<&str, Vec<SegmentSummary<'_>>> {
    let mut acc: BTreeMap<(&str, &str), (f64, f64, f64, usize, usize)> = BTreeMap::new();
    for m in metrics.iter().filter(|m| m.segment_key == key) {
        let e = acc
            .entry((m.segment_value.as_str(), m.model_name.as_str()))
            .or_insert((0.0, 0.0, 0.0, 0, 0));
        e.0 += m.mae;
        e.1 += m.rmse;
        e.2 += m.nmae;
        e.3 += 1;
        e.4 += m.samples;
    }

    let mut out: BTreeMap<&str, Vec<SegmentSummary<'_>>> = BTreeMap::new();
    for ((value, model_name), (mae_sum, rmse_sum, nmae_sum, n, samples)) in acc {
        out.entry(value).or_default().push(SegmentSummary {
            model_name,
            mae: mae_sum / n as f64,
            rmse: rmse_sum / n as f64,
            nmae: nmae_sum / n as f64,
            samples,
        });
    }
    for models in out.values_mut() {
        models.sort_by(|a, b| a.mae.total_cmp(&b.mae));
        models.truncate(SEGMENT_TOP_MODELS);
    }
    out
}

fn push_segment_section(md: &mut String, title: &str, metrics: &[MetricRow], key: SegmentKey) {
    md.push_str(&format!("## {title}\n\n"));
    let summary = summarize_segment(metrics, key);
    if summary.is_empty() {
        md.push_str("_None_\n\n");
        return;
    }
    md.push_str("| Segment | Model | MAE | RMSE | nMAE | Samples |\n");
    md.push_str("| --- | --- | ---: | ---: | ---: | ---: |\n");
    for (value, models) in &summary {
        for s in models {
            md.push_str(&format!(
                "| {} | {} | {:.6} | {:.6} | {:.6} | {} |\n",
                value, s.model_name, s.mae, s.rmse, s.nmae, s.samples
            ));
        }
    }
    md.push('\n');
}

/// Human-readable summary of one run.
pub fn build_markdown_report(outcome: &ExperimentOutcome, dataset_stats: Option<&DatasetStats>) -> String {
    let mut md = String::with_capacity(4096);
    let s = &outcome.summary;

    md.push_str(&format!("# Experiment Report: {}\n\n", s.experiment));

    md.push_str("## Run\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Dataset Version | {} |\n", s.dataset_version));
    md.push_str(&format!("| Sites | {} |\n", s.sites.join(", ")));
    md.push_str(&format!("| Period | {} to {} |\n", s.time_start, s.time_end));
    md.push_str(&format!(
        "| Horizons | {} |\n",
        s.horizons.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(", ")
    ));
    md.push_str(&format!("| Model Variants | {} |\n", s.models.len()));
    md.push_str(&format!("| Tasks | {} |\n", s.task_count));
    md.push_str(&format!("| Predictions | {} |\n", s.prediction_count));
    md.push_str(&format!("| Failed Tasks | {} |\n", s.failed_models.len()));
    md.push_str(&format!("| Workers | {} |\n", s.max_workers));
    md.push_str(&format!("| Config Fingerprint | {} |\n", s.config_fingerprint));
    if let Some(stats) = dataset_stats {
        md.push_str(&format!("| Dataset Hash | {} |\n", stats.dataset_hash));
        if let Some(csv) = &stats.csv {
            md.push_str(&format!(
                "| CSV Rows | {} aligned, {} kept, {} dropped |\n",
                csv.rows_aligned, csv.rows_final, csv.rows_dropped_target_parse
            ));
        } else {
            md.push_str("| Data | **SYNTHETIC** |\n");
        }
    }
    md.push('\n');

    md.push_str("## Leaderboard\n\n");
    md.push_str("| Site | Model | avg MAE | avg RMSE |\n");
    md.push_str("| --- | --- | ---: | ---: |\n");
    for row in outcome.leaderboard.iter().take(REPORT_TOP_ROWS) {
        md.push_str(&format!(
            "| {} | {} | {:.6} | {:.6} |\n",
            row.site_id, row.model_name, row.avg_mae, row.avg_rmse
        ));
    }
    md.push('\n');

    push_segment_section(&mut md, "By Season", &outcome.metrics, SegmentKey::Season);
    push_segment_section(&mut md, "By Wind Bin", &outcome.metrics, SegmentKey::WindBin);

    md.push_str("## Stability\n\n");
    md.push_str("| Site | Model | mean MAE | std MAE | cv MAE | Horizons |\n");
    md.push_str("| --- | --- | ---: | ---: | ---: | ---: |\n");
    for row in outcome.stability.iter().take(REPORT_TOP_ROWS) {
        md.push_str(&format!(
            "| {} | {} | {:.6} | {:.6} | {:.6} | {} |\n",
            row.site_id, row.model_name, row.mean_mae, row.std_mae, row.cv_mae, row.horizon_count
        ));
    }
    md.push('\n');

    md.push_str("## Failed Models\n\n");
    if outcome.failures.is_empty() {
        md.push_str("_None_\n");
    } else {
        md.push_str("| Model | Site | Error |\n");
        md.push_str("| --- | --- | --- |\n");
        for f in &outcome.failures {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                f.model_label,
                f.site_id,
                f.error.replace('|', "\\|")
            ));
        }
    }

    md
}
