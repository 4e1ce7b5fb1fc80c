//! Evaluation metrics for likelihood-ratio systems.
//!
//! All functions are pure reductions over parallel (value, label) sequences:
//! no state persists between calls and the result depends only on the
//! multiset of pairs.

use serde::{Deserialize, Serialize};

use lr_core::{Hypothesis, LrError};

/// The metric triple recorded per experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub cllr: f64,
    pub auc: f64,
    pub accuracy: f64,
}

/// Compute all metrics for one scored test set.
pub fn compute_all(lrs: &[f64], labels: &[Hypothesis]) -> Result<MetricSet, LrError> {
    Ok(MetricSet {
        cllr: cllr(lrs, labels)?,
        auc: auc(lrs, labels)?,
        accuracy: accuracy(lrs, labels, 1.0)?,
    })
}

fn check_lengths(values: &[f64], labels: &[Hypothesis]) -> Result<(), LrError> {
    if values.len() != labels.len() {
        return Err(LrError::ConfigurationError(format!(
            "{} values for {} labels",
            values.len(),
            labels.len()
        )));
    }
    Ok(())
}

/// Log-likelihood-ratio cost:
/// `Cllr = 1/2 (mean_H1 log2(1 + 1/LR) + mean_H2 log2(1 + LR))`.
///
/// 0 is perfect, 1 matches the uninformative LR = 1 baseline, above 1 is
/// miscalibrated.  Undefined without samples from both hypotheses.
pub fn cllr(lrs: &[f64], labels: &[Hypothesis]) -> Result<f64, LrError> {
    check_lengths(lrs, labels)?;

    let mut h1_sum = 0.0;
    let mut h1_n = 0usize;
    let mut h2_sum = 0.0;
    let mut h2_n = 0usize;
    for (&lr, &label) in lrs.iter().zip(labels) {
        match label {
            Hypothesis::SameSource => {
                h1_sum += (1.0 + 1.0 / lr).log2();
                h1_n += 1;
            }
            Hypothesis::DifferentSource => {
                h2_sum += (1.0 + lr).log2();
                h2_n += 1;
            }
        }
    }
    if h1_n == 0 || h2_n == 0 {
        return Err(LrError::InsufficientData(format!(
            "Cllr needs both hypotheses, got {h1_n} same-source and {h2_n} different-source LRs"
        )));
    }
    Ok(0.5 * (h1_sum / h1_n as f64 + h2_sum / h2_n as f64))
}

/// Area under the ROC curve via the rank-sum (Mann-Whitney) formulation with
/// midrank tie handling.  Invariant under strictly increasing transforms of
/// the values.
pub fn auc(values: &[f64], labels: &[Hypothesis]) -> Result<f64, LrError> {
    check_lengths(values, labels)?;

    let n1 = labels.iter().filter(|l| l.is_same_source()).count();
    let n2 = labels.len() - n1;
    if n1 == 0 || n2 == 0 {
        return Err(LrError::InsufficientData(format!(
            "AUC needs both hypotheses, got {n1} same-source and {n2} different-source values"
        )));
    }

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal)
    });

    // Midranks: tied values share the average of their rank range.
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let midrank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = midrank;
        }
        i = j + 1;
    }

    let rank_sum_h1: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, l)| l.is_same_source())
        .map(|(r, _)| r)
        .sum();
    let u = rank_sum_h1 - (n1 * (n1 + 1)) as f64 / 2.0;
    Ok(u / (n1 * n2) as f64)
}

/// Fraction of samples where thresholding the LR agrees with ground truth.
pub fn accuracy(lrs: &[f64], labels: &[Hypothesis], threshold: f64) -> Result<f64, LrError> {
    check_lengths(lrs, labels)?;
    if lrs.is_empty() {
        return Err(LrError::InsufficientData("accuracy of an empty test set".to_string()));
    }
    let correct = lrs
        .iter()
        .zip(labels)
        .filter(|(&lr, &label)| (lr > threshold) == label.is_same_source())
        .count();
    Ok(correct as f64 / lrs.len() as f64)
}
