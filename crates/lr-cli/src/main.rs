//! lr-cli: run a calibration experiment grid from a JSON plan.
//!
//! Usage:
//!   lr-cli <plan.json>
//!
//! The plan lists dataset sources (synthetic definitions or score files),
//! the calibrator catalog entries to evaluate, and split/repeat settings.
//! Results land in `output/<timestamp>/` as `results.json` + `results.csv`
//! (`LR_OUTPUT_DIR` overrides the output root).

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use experiment_engine::{
    run_grid, DatasetSource, ExperimentPlan, ExperimentStatus, InMemoryDataset, SyntheticDataset,
};
use lr_core::LabeledScore;

/// One dataset entry in the plan file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DatasetConfig {
    /// Seeded two-normal generator.
    Synthetic(SyntheticDataset),
    /// JSON file holding an array of `{"score": .., "label": ..}` pairs
    /// produced by an external scorer.
    ScoresFile { id: String, path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
struct RunConfig {
    datasets: Vec<DatasetConfig>,
    #[serde(flatten)]
    plan: ExperimentPlan,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let mut args = std::env::args().skip(1);
    let plan_path = match args.next() {
        Some(p) => PathBuf::from(p),
        None => bail!("usage: lr-cli <plan.json>"),
    };

    let raw = fs::read_to_string(&plan_path)
        .with_context(|| format!("reading plan {}", plan_path.display()))?;
    let config: RunConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing plan {}", plan_path.display()))?;

    tracing::info!(
        datasets = config.datasets.len(),
        calibrators = config.plan.calibrators.len(),
        repeats = config.plan.repeats,
        fraction_test = config.plan.fraction_test,
        "loaded experiment plan"
    );

    // Score files are read up front: an unreadable file is a malformed plan,
    // not a per-unit data anomaly.
    let mut sources: Vec<Box<dyn DatasetSource>> = Vec::with_capacity(config.datasets.len());
    for dataset in &config.datasets {
        match dataset {
            DatasetConfig::Synthetic(s) => sources.push(Box::new(s.clone())),
            DatasetConfig::ScoresFile { id, path } => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading scores file {}", path.display()))?;
                let pairs: Vec<LabeledScore> = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing scores file {}", path.display()))?;
                tracing::info!(dataset = %id, pairs = pairs.len(), "loaded score file");
                sources.push(Box::new(InMemoryDataset::new(id.clone(), pairs)));
            }
        }
    }

    let table = run_grid(&config.plan, &sources)?;

    for record in table.records() {
        match (&record.status, &record.metrics) {
            (ExperimentStatus::Completed, Some(m)) => tracing::info!(
                dataset = %record.dataset_id,
                calibrator = %record.calibrator_id,
                repeat = record.repeat,
                cllr = m.cllr,
                auc = m.auc,
                accuracy = m.accuracy,
                "completed"
            ),
            (ExperimentStatus::Failed { phase, kind, message }, _) => tracing::warn!(
                dataset = %record.dataset_id,
                calibrator = %record.calibrator_id,
                repeat = record.repeat,
                ?phase,
                kind = %kind,
                error = %message,
                "failed"
            ),
            _ => {}
        }
    }

    let out_root = std::env::var("LR_OUTPUT_DIR").unwrap_or_else(|_| "output".to_string());
    let out_dir = PathBuf::from(out_root).join(chrono::Local::now().format("%Y%m%d-%H%M%S").to_string());
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let json_path = out_dir.join("results.json");
    fs::write(&json_path, serde_json::to_string_pretty(&table)?)
        .with_context(|| format!("writing {}", json_path.display()))?;
    let csv_path = out_dir.join("results.csv");
    fs::write(&csv_path, table.to_csv())
        .with_context(|| format!("writing {}", csv_path.display()))?;

    tracing::info!(
        completed = table.completed().count(),
        failed = table.failed().count(),
        output = %out_dir.display(),
        "run finished"
    );
    Ok(())
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_file_parses_with_both_dataset_kinds() {
        let json = r#"{
            "datasets": [
                {"kind": "synthetic", "id": "sep", "n_per_class": 50,
                 "same_mean": 0.8, "same_sd": 0.05,
                 "diff_mean": 0.3, "diff_sd": 0.05, "seed": 1},
                {"kind": "scores_file", "id": "lfw", "path": "scores/lfw.json"}
            ],
            "calibrators": [
                {"name": "dummy"},
                {"name": "logit"},
                {"name": "elub_KDE", "kde_bandwidth": 0.05}
            ],
            "repeats": 10,
            "fraction_test": 0.25,
            "base_seed": 42
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.datasets.len(), 2);
        assert_eq!(config.plan.calibrators.len(), 3);
        assert_eq!(config.plan.repeats, 10);
    }

    #[test]
    fn unknown_calibrator_in_plan_is_rejected_at_parse() {
        let json = r#"{
            "datasets": [],
            "calibrators": [{"name": "temperature"}]
        }"#;
        assert!(serde_json::from_str::<RunConfig>(json).is_err());
    }
}
