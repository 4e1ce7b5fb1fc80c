use serde::{Deserialize, Serialize};

use metrics::MetricSet;

/// Phase of an experiment unit at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DataLoaded,
    CalibratorFitted,
    Scored,
}

/// Terminal state of one experiment unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExperimentStatus {
    Completed,
    Failed {
        phase: Phase,
        kind: String,
        message: String,
    },
}

/// One row of the results table.  Rows are append-only; failed rows carry
/// the error kind instead of metric values so downstream analysis can filter
/// failures explicitly instead of averaging over holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub dataset_id: String,
    pub calibrator_id: String,
    pub repeat: u32,
    pub split_seed: u64,
    pub status: ExperimentStatus,
    pub metrics: Option<MetricSet>,
}

impl ExperimentRecord {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, ExperimentStatus::Completed)
    }
}

/// Append-only collection of experiment records; the terminal output
/// artifact of a grid run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsTable {
    records: Vec<ExperimentRecord>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ExperimentRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ExperimentRecord>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[ExperimentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn completed(&self) -> impl Iterator<Item = &ExperimentRecord> {
        self.records.iter().filter(|r| r.is_completed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ExperimentRecord> {
        self.records.iter().filter(|r| !r.is_completed())
    }

    /// Fixed-schema CSV rendering.  Failed rows leave the metric cells
    /// empty and fill the error column.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("dataset,calibrator,repeat,seed,status,error,cllr,auc,accuracy\n");
        for r in &self.records {
            let (status, error) = match &r.status {
                ExperimentStatus::Completed => ("completed", String::new()),
                ExperimentStatus::Failed { kind, .. } => ("failed", kind.clone()),
            };
            let (cllr, auc, accuracy) = match &r.metrics {
                Some(m) => (format!("{:.6}", m.cllr), format!("{:.6}", m.auc), format!("{:.6}", m.accuracy)),
                None => (String::new(), String::new(), String::new()),
            };
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                r.dataset_id, r.calibrator_id, r.repeat, r.split_seed, status, error, cllr, auc, accuracy
            ));
        }
        out
    }
}
