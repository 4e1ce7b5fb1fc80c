use serde::{Deserialize, Serialize};

/// Largest likelihood ratio a calibrator may emit.  Applied wherever the
/// different-source density vanishes while the same-source density does not,
/// so downstream metrics stay finite.
pub const LR_CAP: f64 = 1e10;

/// Smallest likelihood ratio a calibrator may emit (mirror of [`LR_CAP`]).
pub const LR_FLOOR: f64 = 1e-10;

/// The two competing hypotheses in a forensic comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hypothesis {
    /// H1: both images show the same identity.
    SameSource,
    /// H2: the images show different identities.
    DifferentSource,
}

impl Hypothesis {
    pub fn is_same_source(self) -> bool {
        matches!(self, Hypothesis::SameSource)
    }
}

/// One comparison outcome: the raw similarity score produced upstream plus
/// its ground-truth label.  Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledScore {
    pub score: f64,
    pub label: Hypothesis,
}

impl LabeledScore {
    pub fn same_source(score: f64) -> Self {
        Self { score, label: Hypothesis::SameSource }
    }

    pub fn different_source(score: f64) -> Self {
        Self { score, label: Hypothesis::DifferentSource }
    }
}

/// Split a set of labeled scores into (H1 scores, H2 scores).
pub fn split_by_label(pairs: &[LabeledScore]) -> (Vec<f64>, Vec<f64>) {
    let mut h1 = Vec::new();
    let mut h2 = Vec::new();
    for pair in pairs {
        match pair.label {
            Hypothesis::SameSource => h1.push(pair.score),
            Hypothesis::DifferentSource => h2.push(pair.score),
        }
    }
    (h1, h2)
}

/// Clamp a likelihood ratio into the representable range.  NaN has no
/// defensible reading as evidence and maps to the floor.
pub fn clamp_lr(lr: f64) -> f64 {
    if lr.is_nan() {
        LR_FLOOR
    } else {
        lr.clamp(LR_FLOOR, LR_CAP)
    }
}
