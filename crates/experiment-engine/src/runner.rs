use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use calibration::build_calibrator;
use lr_core::{train_test_split, Hypothesis, LabeledScore, LrError};
use metrics::compute_all;

use crate::data::DatasetSource;
use crate::plan::{expand_plan, ExperimentPlan, ExperimentSpec};
use crate::records::{ExperimentRecord, ExperimentStatus, Phase, ResultsTable};

/// Run a whole experiment grid.
///
/// Configuration errors (unknown calibrators, bad fractions) abort the run
/// before any unit starts.  After that, units are independent: each runs
/// fit → transform → metrics on its own split and any failure is downgraded
/// to a Failed row.  Units run on the rayon pool; each dataset is loaded
/// once and shared read-only.
pub fn run_grid(
    plan: &ExperimentPlan,
    sources: &[Box<dyn DatasetSource>],
) -> Result<ResultsTable, LrError> {
    let specs = expand_plan(plan, sources)?;
    info!(
        units = specs.len(),
        datasets = sources.len(),
        calibrators = plan.calibrators.len(),
        repeats = plan.repeats,
        "expanded experiment grid"
    );

    // Load each dataset once; a load failure fails every unit that needs it,
    // at the data phase, without touching the rest of the grid.
    let loaded: Vec<Result<Arc<[LabeledScore]>, LrError>> = sources
        .iter()
        .map(|s| s.load().map(Arc::from))
        .collect();

    let records: Vec<ExperimentRecord> = specs
        .par_iter()
        .map(|spec| run_unit(spec, plan.fraction_test, &loaded))
        .collect();

    let mut table = ResultsTable::new();
    table.extend(records);
    info!(
        completed = table.completed().count(),
        failed = table.failed().count(),
        "experiment grid finished"
    );
    Ok(table)
}

fn run_unit(
    spec: &ExperimentSpec,
    fraction_test: f64,
    loaded: &[Result<Arc<[LabeledScore]>, LrError>],
) -> ExperimentRecord {
    match run_phases(spec, fraction_test, loaded) {
        Ok(metrics) => {
            debug!(
                dataset = %spec.dataset_id,
                calibrator = %spec.calibrator.id(),
                repeat = spec.repeat,
                cllr = metrics.cllr,
                "experiment unit completed"
            );
            ExperimentRecord {
                dataset_id: spec.dataset_id.clone(),
                calibrator_id: spec.calibrator.id(),
                repeat: spec.repeat,
                split_seed: spec.split_seed,
                status: ExperimentStatus::Completed,
                metrics: Some(metrics),
            }
        }
        Err((phase, err)) => {
            warn!(
                dataset = %spec.dataset_id,
                calibrator = %spec.calibrator.id(),
                repeat = spec.repeat,
                ?phase,
                error = %err,
                "experiment unit failed"
            );
            ExperimentRecord {
                dataset_id: spec.dataset_id.clone(),
                calibrator_id: spec.calibrator.id(),
                repeat: spec.repeat,
                split_seed: spec.split_seed,
                status: ExperimentStatus::Failed {
                    phase,
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                },
                metrics: None,
            }
        }
    }
}

/// The strictly sequential phases of one unit.  The phase tag on the error
/// records how far the unit got.
fn run_phases(
    spec: &ExperimentSpec,
    fraction_test: f64,
    loaded: &[Result<Arc<[LabeledScore]>, LrError>],
) -> Result<metrics::MetricSet, (Phase, LrError)> {
    // Pending -> DataLoaded
    let pairs = loaded[spec.dataset_idx]
        .as_ref()
        .map_err(|e| (Phase::DataLoaded, e.clone()))?;
    let split = train_test_split(pairs, fraction_test, spec.split_seed)
        .map_err(|e| (Phase::DataLoaded, e))?;

    // DataLoaded -> CalibratorFitted
    let mut calibrator = build_calibrator(spec.calibrator.name, &spec.calibrator.params)
        .map_err(|e| (Phase::CalibratorFitted, e))?;
    calibrator.fit(&split.train).map_err(|e| (Phase::CalibratorFitted, e))?;

    // CalibratorFitted -> Scored.  Out-of-support test scores are dropped;
    // the unit fails only if nothing survives.
    let mut lrs: Vec<f64> = Vec::with_capacity(split.test.len());
    let mut labels: Vec<Hypothesis> = Vec::with_capacity(split.test.len());
    let mut dropped = 0usize;
    for pair in &split.test {
        match calibrator.transform(pair.score) {
            Ok(lr) => {
                lrs.push(lr);
                labels.push(pair.label);
            }
            Err(LrError::OutOfSupport(_)) => dropped += 1,
            Err(e) => return Err((Phase::Scored, e)),
        }
    }
    if dropped > 0 {
        warn!(
            dataset = %spec.dataset_id,
            calibrator = %spec.calibrator.id(),
            dropped,
            "dropped out-of-support test scores"
        );
    }

    // Scored -> Recorded
    compute_all(&lrs, &labels).map_err(|e| (Phase::Scored, e))
}
