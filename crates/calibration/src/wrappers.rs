use tracing::warn;

use lr_core::{clamp_lr, Calibrator, LabeledScore, LrError};

/// ELUB bounder: clamps the inner calibrator's output to the empirically
/// tightest LR range the training data can support.
///
/// Bound policy (see DESIGN.md): take the extreme LRs the inner calibrator
/// produces on its own training scores, cap the upper bound at the
/// different-source sample count and the lower bound at one over the
/// same-source sample count, then force the range to bracket 1.  A claim of
/// evidence strength beyond the opposing class's sample size has no
/// empirical support.
pub struct ElubBounder {
    inner: Box<dyn Calibrator>,
    bounds: Option<(f64, f64)>,
}

impl ElubBounder {
    pub fn new(inner: Box<dyn Calibrator>) -> Self {
        Self { inner, bounds: None }
    }

    /// Bounds computed at fit time, `(lower, upper)`.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    fn compute_bounds(&self, pairs: &[LabeledScore]) -> Result<(f64, f64), LrError> {
        let mut n_h1 = 0usize;
        let mut n_h2 = 0usize;
        let mut min_lr = f64::INFINITY;
        let mut max_lr = f64::NEG_INFINITY;
        let mut skipped = 0usize;
        for pair in pairs {
            match self.inner.transform(pair.score) {
                Ok(lr) => {
                    if pair.label.is_same_source() {
                        n_h1 += 1;
                    } else {
                        n_h2 += 1;
                    }
                    min_lr = min_lr.min(lr);
                    max_lr = max_lr.max(lr);
                }
                Err(LrError::OutOfSupport(_)) => skipped += 1,
                Err(e) => return Err(e),
            }
        }
        if skipped > 0 {
            warn!(skipped, "ELUB bound derivation skipped out-of-support training scores");
        }
        if n_h1 == 0 || n_h2 == 0 {
            return Err(LrError::InsufficientData(
                "ELUB bounds need supported training scores from both classes".to_string(),
            ));
        }

        let lower = min_lr.max(1.0 / n_h1 as f64).min(1.0);
        let upper = max_lr.min(n_h2 as f64).max(1.0);
        Ok((lower, upper))
    }
}

impl Calibrator for ElubBounder {
    fn fit(&mut self, pairs: &[LabeledScore]) -> Result<(), LrError> {
        self.bounds = None;
        self.inner.fit(pairs)?;
        self.bounds = Some(self.compute_bounds(pairs)?);
        Ok(())
    }

    fn transform(&self, score: f64) -> Result<f64, LrError> {
        let (lower, upper) = self.bounds.ok_or(LrError::UnfittedState("elub"))?;
        Ok(self.inner.transform(score)?.clamp(lower, upper))
    }

    fn is_fitted(&self) -> bool {
        self.bounds.is_some()
    }
}

/// Normalizer: log-shifts the inner calibrator's output so the geometric
/// mean LR over the training scores is 1 (mean log-LR = 0).
pub struct NormalizedCalibrator {
    inner: Box<dyn Calibrator>,
    // log10 of the training geometric mean; subtracted from every output.
    log_shift: Option<f64>,
}

impl NormalizedCalibrator {
    pub fn new(inner: Box<dyn Calibrator>) -> Self {
        Self { inner, log_shift: None }
    }
}

impl Calibrator for NormalizedCalibrator {
    fn fit(&mut self, pairs: &[LabeledScore]) -> Result<(), LrError> {
        self.log_shift = None;
        self.inner.fit(pairs)?;

        let mut sum = 0.0;
        let mut n = 0usize;
        for pair in pairs {
            match self.inner.transform(pair.score) {
                Ok(lr) => {
                    sum += lr.log10();
                    n += 1;
                }
                Err(LrError::OutOfSupport(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if n == 0 {
            return Err(LrError::InsufficientData(
                "no supported training scores to normalize against".to_string(),
            ));
        }
        self.log_shift = Some(sum / n as f64);
        Ok(())
    }

    fn transform(&self, score: f64) -> Result<f64, LrError> {
        let shift = self.log_shift.ok_or(LrError::UnfittedState("normalized"))?;
        let lr = self.inner.transform(score)?;
        Ok(clamp_lr(10f64.powf(lr.log10() - shift)))
    }

    fn is_fitted(&self) -> bool {
        self.log_shift.is_some()
    }
}

/// Class weighting applied to the fitting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassWeighting {
    /// Weight each sample by `n / (2 * n_class)` so both hypotheses carry
    /// equal total weight regardless of dataset imbalance.
    Balanced,
    /// Pass the samples through unweighted.
    Off,
}

/// Wrapper that reweights the two classes during `fit`; `transform` is the
/// inner calibrator's, untouched.
pub struct ClassBalancer {
    inner: Box<dyn Calibrator>,
    weighting: ClassWeighting,
}

impl ClassBalancer {
    pub fn new(inner: Box<dyn Calibrator>, weighting: ClassWeighting) -> Self {
        Self { inner, weighting }
    }

    pub fn balanced(inner: Box<dyn Calibrator>) -> Self {
        Self::new(inner, ClassWeighting::Balanced)
    }
}

impl Calibrator for ClassBalancer {
    fn fit(&mut self, pairs: &[LabeledScore]) -> Result<(), LrError> {
        match self.weighting {
            ClassWeighting::Off => self.inner.fit(pairs),
            ClassWeighting::Balanced => {
                let n = pairs.len() as f64;
                let n_h1 = pairs.iter().filter(|p| p.label.is_same_source()).count() as f64;
                let n_h2 = n - n_h1;
                if n_h1 == 0.0 || n_h2 == 0.0 {
                    return Err(LrError::InsufficientData(
                        "balanced weighting needs both classes present".to_string(),
                    ));
                }
                let weights: Vec<f64> = pairs
                    .iter()
                    .map(|p| {
                        if p.label.is_same_source() {
                            n / (2.0 * n_h1)
                        } else {
                            n / (2.0 * n_h2)
                        }
                    })
                    .collect();
                self.inner.fit_weighted(pairs, &weights)
            }
        }
    }

    fn transform(&self, score: f64) -> Result<f64, LrError> {
        self.inner.transform(score)
    }

    fn is_fitted(&self) -> bool {
        self.inner.is_fitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrators::{DummyCalibrator, KdeCalibrator, LogitCalibrator};
    use lr_core::LR_CAP;

    fn overlapping(n: usize) -> Vec<LabeledScore> {
        // Deterministic interleaved classes with some overlap.
        (0..n)
            .map(|i| LabeledScore::same_source(0.5 + (i % 13) as f64 * 0.03))
            .chain((0..n).map(|i| LabeledScore::different_source(0.2 + (i % 13) as f64 * 0.03)))
            .collect()
    }

    #[test]
    fn elub_outputs_stay_within_bounds() {
        let mut cal = ElubBounder::new(Box::new(LogitCalibrator::new()));
        let train = overlapping(40);
        cal.fit(&train).unwrap();
        let (lower, upper) = cal.bounds().unwrap();
        assert!(lower <= 1.0 && upper >= 1.0);

        for s in [-5.0, 0.0, 0.3, 0.6, 0.9, 5.0] {
            let lr = cal.transform(s).unwrap();
            assert!(lr >= lower && lr <= upper, "lr {lr} outside [{lower}, {upper}]");
        }
    }

    #[test]
    fn elub_bound_is_idempotent() {
        let mut cal = ElubBounder::new(Box::new(LogitCalibrator::new()));
        cal.fit(&overlapping(40)).unwrap();
        let (lower, upper) = cal.bounds().unwrap();
        for s in [-5.0, 0.45, 5.0] {
            let once = cal.transform(s).unwrap();
            assert_eq!(once.clamp(lower, upper), once);
        }
    }

    #[test]
    fn elub_bounds_capped_by_sample_counts() {
        // Tiny, perfectly separated training set: the raw logit LRs hit the
        // clamp range, but the bound may not exceed what 3 opposing samples
        // can support.
        let pairs = vec![
            LabeledScore::same_source(0.9),
            LabeledScore::same_source(0.85),
            LabeledScore::same_source(0.8),
            LabeledScore::different_source(0.1),
            LabeledScore::different_source(0.15),
            LabeledScore::different_source(0.2),
        ];
        let mut cal = ElubBounder::new(Box::new(LogitCalibrator::new()));
        cal.fit(&pairs).unwrap();
        let (lower, upper) = cal.bounds().unwrap();
        assert!(upper <= 3.0);
        assert!(lower >= 1.0 / 3.0);
        assert!(cal.transform(0.99).unwrap() < LR_CAP);
    }

    #[test]
    fn elub_unfitted_is_state_error() {
        let cal = ElubBounder::new(Box::new(DummyCalibrator::new()));
        assert_eq!(cal.transform(0.5).unwrap_err().kind(), "unfitted_state");
    }

    #[test]
    fn normalizer_zeroes_mean_training_log_lr() {
        let train = overlapping(30);
        let mut cal = NormalizedCalibrator::new(Box::new(KdeCalibrator::new()));
        cal.fit(&train).unwrap();

        let mean_log: f64 = train
            .iter()
            .map(|p| cal.transform(p.score).unwrap().log10())
            .sum::<f64>()
            / train.len() as f64;
        assert!(mean_log.abs() < 1e-9, "mean log10 LR = {mean_log}");
    }

    #[test]
    fn normalizer_preserves_ordering() {
        let train = overlapping(30);
        let mut plain = KdeCalibrator::new();
        plain.fit(&train).unwrap();
        let mut normalized = NormalizedCalibrator::new(Box::new(KdeCalibrator::new()));
        normalized.fit(&train).unwrap();

        let scores = [0.2, 0.35, 0.5, 0.65, 0.8];
        let a = plain.transform_all(&scores).unwrap();
        let b = normalized.transform_all(&scores).unwrap();
        for (x, y) in a.windows(2).zip(b.windows(2)) {
            assert_eq!(x[0] < x[1], y[0] < y[1]);
        }
    }

    #[test]
    fn balancer_off_matches_plain_fit() {
        let train = overlapping(20);
        let mut plain = LogitCalibrator::new();
        plain.fit(&train).unwrap();
        let mut wrapped = ClassBalancer::new(Box::new(LogitCalibrator::new()), ClassWeighting::Off);
        wrapped.fit(&train).unwrap();
        assert_eq!(plain.transform(0.4).unwrap(), wrapped.transform(0.4).unwrap());
    }

    #[test]
    fn balancer_balanced_shifts_imbalanced_fit() {
        // 3:1 imbalance; balancing must change the fitted mapping.
        let mut train = overlapping(60);
        train.retain(|p| p.label.is_same_source() || p.score < 0.35);
        let n_h2 = train.iter().filter(|p| !p.label.is_same_source()).count();
        assert!(n_h2 > 2 && n_h2 < train.len() / 2);

        let mut plain = LogitCalibrator::new();
        plain.fit(&train).unwrap();
        let mut balanced = ClassBalancer::balanced(Box::new(LogitCalibrator::new()));
        balanced.fit(&train).unwrap();
        assert_ne!(plain.transform(0.5).unwrap(), balanced.transform(0.5).unwrap());
    }

    #[test]
    fn balancer_on_unweightable_inner_is_config_error() {
        let mut cal = ClassBalancer::balanced(Box::new(KdeCalibrator::new()));
        assert_eq!(cal.fit(&overlapping(10)).unwrap_err().kind(), "configuration_error");
    }

    #[test]
    fn wrapper_stacks_compose_in_order() {
        // bound(normalize(logit)) vs normalize(bound(logit)) differ when the
        // normalization shift pushes outputs across the bound edge.
        let train = overlapping(40);

        let mut bound_outer = ElubBounder::new(Box::new(NormalizedCalibrator::new(Box::new(
            LogitCalibrator::new(),
        ))));
        bound_outer.fit(&train).unwrap();

        let mut norm_outer = NormalizedCalibrator::new(Box::new(ElubBounder::new(Box::new(
            LogitCalibrator::new(),
        ))));
        norm_outer.fit(&train).unwrap();

        // Both are valid calibrators; outputs at the extremes need not agree.
        let a = bound_outer.transform(0.95).unwrap();
        let b = norm_outer.transform(0.95).unwrap();
        assert!(a.is_finite() && b.is_finite());
        assert!(a > 0.0 && b > 0.0);
    }
}
