//! Full pipeline to disk: dataset → run → artifacts → registry.

use std::io::Write;
use std::sync::Arc;

use windrace_core::{Dataset, LeastSquaresProvider, ModelRegistry};
use windrace_runner::{
    load_run_summary, load_scada_nwp_series, run_experiment, save_run_artifacts, synthetic_dataset,
    CsvLoadOptions, DatasetRegistry, DatasetStats, ExperimentConfig, SegmentKey,
};

const DEMO_CONFIG: &str = r#"
name = "artifact_run"
dataset_version = "synthetic_v1"
horizons = [1, 2]
train_size = 48
max_workers = 2

[model_type_limits]
boost = 1

[[models]]
name = "persistence"

[[models]]
name = "moving_average"
params = { window = 3 }

[[models]]
name = "lightgbm"
params_grid = { lags = [2, 4] }
search = { method = "grid", max_trials = 0 }
"#;

#[test]
fn synthetic_run_writes_full_bundle() {
    let config = ExperimentConfig::from_toml(DEMO_CONFIG).unwrap();
    let sites = vec!["site_a".to_string(), "site_b".to_string()];
    let dataset = synthetic_dataset(&sites, 96);
    let stats = DatasetStats::synthetic(&sites, 96, &dataset);
    let factory = ModelRegistry::with_builtins().with_estimator_for_all(Arc::new(LeastSquaresProvider));

    let outcome = run_experiment(&config, &dataset, &factory).unwrap();
    let out_root = tempfile::tempdir().unwrap();
    let run_dir = save_run_artifacts(&outcome, Some(&stats), out_root.path()).unwrap();

    assert!(run_dir
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("artifact_run_")));
    assert!(run_dir.join("dataset_profile.json").exists());

    let predictions = std::fs::read_to_string(run_dir.join("predictions.csv")).unwrap();
    // header + 4 templates × 2 sites × 47 origins × 2 horizons
    assert_eq!(predictions.lines().count(), 1 + 4 * 2 * 47 * 2);

    let leaderboard = std::fs::read_to_string(run_dir.join("leaderboard.csv")).unwrap();
    assert!(leaderboard.starts_with("site_id,model_name,avg_MAE,avg_RMSE"));
    assert_eq!(leaderboard.lines().count(), 1 + 8);

    let report = std::fs::read_to_string(run_dir.join("report.md")).unwrap();
    assert!(report.contains("| Data | **SYNTHETIC** |"));
    assert!(report.contains("lightgbm[lags=2]"));

    let summary = load_run_summary(&run_dir).unwrap();
    assert_eq!(summary.experiment, "artifact_run");
    assert_eq!(summary.models.len(), 4);
    assert_eq!(summary.dataset_stats.as_ref().map(|s| s.dataset_hash.as_str()), Some(stats.dataset_hash.as_str()));

    let registry = DatasetRegistry::new(out_root.path().join("dataset_registry.json"));
    registry.register(&outcome.dataset_version).unwrap();
    let stored = registry.get("synthetic_v1").unwrap().unwrap();
    assert_eq!(stored.site_ids, sites);
    assert_eq!(stored.time_end, "t95");
}

#[test]
fn csv_dataset_runs_with_exogenous_segments() {
    let dir = tempfile::tempdir().unwrap();
    let mut scada = String::from("Timestamp,Total_Power\n");
    let mut nwp = String::from("Timestamp,wind_speed,direction\n");
    for i in 0..40 {
        let ts = format!("2023/7/{} {}:00", 1 + i / 24, i % 24);
        let ws = 2.0 + (i % 10) as f64;
        scada.push_str(&format!("{ts},{:.3}\n", ws * 0.1));
        nwp.push_str(&format!("{ts},{ws},{}\n", 180 + i));
    }
    let scada_path = dir.path().join("scada.csv");
    let nwp_path = dir.path().join("nwp.csv");
    std::fs::File::create(&scada_path).unwrap().write_all(scada.as_bytes()).unwrap();
    std::fs::File::create(&nwp_path).unwrap().write_all(nwp.as_bytes()).unwrap();

    let opts = CsvLoadOptions {
        site_id: "farm".into(),
        ..CsvLoadOptions::default()
    };
    let (site, csv_stats) = load_scada_nwp_series(&scada_path, &nwp_path, &opts).unwrap();
    assert_eq!(csv_stats.rows_final, 40);
    let dataset = Dataset::from([("farm".to_string(), site)]);

    let config = ExperimentConfig::from_toml(
        r#"
        horizons = [1]
        train_size = 20
        [[models]]
        name = "linear_exog"
        params = { lags = 2 }
        [[models]]
        name = "persistence"
        "#,
    )
    .unwrap();
    let outcome = run_experiment(&config, &dataset, &ModelRegistry::with_builtins()).unwrap();

    assert!(outcome
        .metrics
        .iter()
        .any(|m| m.segment_key == SegmentKey::Season && m.segment_value == "summer"));
    assert!(outcome
        .metrics
        .iter()
        .any(|m| m.segment_key == SegmentKey::WindBin && m.segment_value != "unknown"));
    assert_eq!(outcome.summary.time_start, "2023/7/1 0:00");

    let stats = DatasetStats::from_csv("farm", &dataset, csv_stats);
    let run_dir = save_run_artifacts(&outcome, Some(&stats), dir.path()).unwrap();
    let profile = std::fs::read_to_string(run_dir.join("dataset_profile.json")).unwrap();
    assert!(profile.contains("\"rows_final\": 40"));
}
