use lr_core::{clamp_lr, split_by_label, Calibrator, LabeledScore, LrError, LR_CAP, LR_FLOOR};

use crate::density::{DensityModel, GaussianKde, MIN_SAMPLES_PER_MODEL};

/// Baseline calibrator: LR = 1 for every score, whatever the training data.
/// Its Cllr is exactly 1, which anchors the "uninformative" end of the scale.
#[derive(Debug, Clone, Default)]
pub struct DummyCalibrator {
    fitted: bool,
}

impl DummyCalibrator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Calibrator for DummyCalibrator {
    fn fit(&mut self, _pairs: &[LabeledScore]) -> Result<(), LrError> {
        self.fitted = true;
        Ok(())
    }

    fn transform(&self, _score: f64) -> Result<f64, LrError> {
        if !self.fitted {
            return Err(LrError::UnfittedState("dummy"));
        }
        Ok(1.0)
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

/// Logistic-regression calibrator.
///
/// Fits `P(H1 | s) = sigmoid(b0 + b1 * s)` by ridge-penalized Newton
/// iterations (IRLS), then reports the posterior odds `p / (1 - p)` as the
/// likelihood ratio.  The small ridge keeps the Newton step solvable on
/// perfectly separable data, where the unpenalized coefficients diverge.
#[derive(Debug, Clone)]
pub struct LogitCalibrator {
    intercept: f64,
    coef: f64,
    fitted: bool,
}

const LOGIT_RIDGE: f64 = 1e-4;
const LOGIT_MAX_ITER: usize = 200;
const LOGIT_MAX_STEP: f64 = 10.0;
const LOGIT_TOL: f64 = 1e-8;

impl LogitCalibrator {
    pub fn new() -> Self {
        Self { intercept: 0.0, coef: 0.0, fitted: false }
    }

    pub fn coefficients(&self) -> (f64, f64) {
        (self.intercept, self.coef)
    }

    fn check(pairs: &[LabeledScore], weights: Option<&[f64]>) -> Result<(), LrError> {
        let (h1, h2) = split_by_label(pairs);
        if h1.len() < MIN_SAMPLES_PER_MODEL || h2.len() < MIN_SAMPLES_PER_MODEL {
            return Err(LrError::InsufficientData(format!(
                "logit needs at least {MIN_SAMPLES_PER_MODEL} samples per class, got {} same-source and {} different-source",
                h1.len(),
                h2.len()
            )));
        }
        if pairs.iter().any(|p| !p.score.is_finite()) {
            return Err(LrError::ConfigurationError(
                "logit training scores must be finite".to_string(),
            ));
        }
        if let Some(w) = weights {
            if w.len() != pairs.len() {
                return Err(LrError::ConfigurationError(format!(
                    "got {} weights for {} samples",
                    w.len(),
                    pairs.len()
                )));
            }
            if w.iter().any(|&x| !(x > 0.0) || !x.is_finite()) {
                return Err(LrError::ConfigurationError(
                    "sample weights must be positive and finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn fit_irls(&mut self, pairs: &[LabeledScore], weights: Option<&[f64]>) -> Result<(), LrError> {
        Self::check(pairs, weights)?;

        let mut b0 = 0.0_f64;
        let mut b1 = 0.0_f64;
        for _ in 0..LOGIT_MAX_ITER {
            // Penalized gradient and Hessian of the log-likelihood.
            let mut g0 = -LOGIT_RIDGE * b0;
            let mut g1 = -LOGIT_RIDGE * b1;
            let mut h00 = LOGIT_RIDGE;
            let mut h01 = 0.0;
            let mut h11 = LOGIT_RIDGE;
            for (i, pair) in pairs.iter().enumerate() {
                let w = weights.map_or(1.0, |ws| ws[i]);
                let x = pair.score;
                let y = if pair.label.is_same_source() { 1.0 } else { 0.0 };
                let p = sigmoid(b0 + b1 * x);
                let r = w * (y - p);
                g0 += r;
                g1 += r * x;
                let v = (w * p * (1.0 - p)).max(1e-12);
                h00 += v;
                h01 += v * x;
                h11 += v * x * x;
            }
            let det = h00 * h11 - h01 * h01;
            if det.abs() < 1e-300 {
                break;
            }
            let mut d0 = (h11 * g0 - h01 * g1) / det;
            let mut d1 = (h00 * g1 - h01 * g0) / det;
            // Damp the step: plain Newton overshoots badly once the
            // sigmoid saturates on (near-)separable data.
            let norm = (d0 * d0 + d1 * d1).sqrt();
            if norm > LOGIT_MAX_STEP {
                d0 *= LOGIT_MAX_STEP / norm;
                d1 *= LOGIT_MAX_STEP / norm;
            }
            b0 += d0;
            b1 += d1;
            if d0.abs() < LOGIT_TOL && d1.abs() < LOGIT_TOL {
                break;
            }
        }

        self.intercept = b0;
        self.coef = b1;
        self.fitted = true;
        Ok(())
    }
}

impl Default for LogitCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator for LogitCalibrator {
    fn fit(&mut self, pairs: &[LabeledScore]) -> Result<(), LrError> {
        self.fit_irls(pairs, None)
    }

    fn fit_weighted(&mut self, pairs: &[LabeledScore], weights: &[f64]) -> Result<(), LrError> {
        self.fit_irls(pairs, Some(weights))
    }

    fn transform(&self, score: f64) -> Result<f64, LrError> {
        if !self.fitted {
            return Err(LrError::UnfittedState("logit"));
        }
        let p = sigmoid(self.intercept + self.coef * score);
        Ok(clamp_lr(p / (1.0 - p)))
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Density-ratio calibrator over per-hypothesis kernel density estimates.
#[derive(Debug, Clone)]
pub struct KdeCalibrator {
    h1: GaussianKde,
    h2: GaussianKde,
    fitted: bool,
}

impl KdeCalibrator {
    pub fn new() -> Self {
        Self { h1: GaussianKde::new(), h2: GaussianKde::new(), fitted: false }
    }

    /// Override Silverman's rule with a fixed bandwidth for both hypotheses.
    pub fn with_bandwidth(bandwidth: f64) -> Result<Self, LrError> {
        Ok(Self {
            h1: GaussianKde::with_bandwidth(bandwidth)?,
            h2: GaussianKde::with_bandwidth(bandwidth)?,
            fitted: false,
        })
    }

    fn ratio(f1: f64, f2: f64, score: f64) -> Result<f64, LrError> {
        if f1 <= 0.0 && f2 <= 0.0 {
            return Err(LrError::OutOfSupport(score));
        }
        if f2 <= 0.0 {
            // Same-source support only: cap instead of reporting infinity.
            return Ok(LR_CAP);
        }
        if f1 <= 0.0 {
            return Ok(LR_FLOOR);
        }
        Ok(clamp_lr(f1 / f2))
    }
}

impl Default for KdeCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator for KdeCalibrator {
    fn fit(&mut self, pairs: &[LabeledScore]) -> Result<(), LrError> {
        let (h1, h2) = split_by_label(pairs);
        self.h1.fit(&h1)?;
        self.h2.fit(&h2)?;
        self.fitted = true;
        Ok(())
    }

    fn transform(&self, score: f64) -> Result<f64, LrError> {
        if !self.fitted {
            return Err(LrError::UnfittedState("KDE"));
        }
        Self::ratio(self.h1.density(score), self.h2.density(score), score)
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

/// Empirical survival-fraction calibrator: LR(s) is the ratio of the
/// per-class fractions of training scores at or above `s`.
#[derive(Debug, Clone, Default)]
pub struct FractionCalibrator {
    h1_sorted: Vec<f64>,
    h2_sorted: Vec<f64>,
    fitted: bool,
}

impl FractionCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn survival(sorted: &[f64], s: f64) -> f64 {
        // First index with value >= s.
        let idx = sorted.partition_point(|&x| x < s);
        (sorted.len() - idx) as f64 / sorted.len() as f64
    }
}

impl Calibrator for FractionCalibrator {
    fn fit(&mut self, pairs: &[LabeledScore]) -> Result<(), LrError> {
        let (mut h1, mut h2) = split_by_label(pairs);
        if h1.len() < MIN_SAMPLES_PER_MODEL || h2.len() < MIN_SAMPLES_PER_MODEL {
            return Err(LrError::InsufficientData(format!(
                "fraction needs at least {MIN_SAMPLES_PER_MODEL} samples per class, got {} and {}",
                h1.len(),
                h2.len()
            )));
        }
        h1.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        h2.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.h1_sorted = h1;
        self.h2_sorted = h2;
        self.fitted = true;
        Ok(())
    }

    fn transform(&self, score: f64) -> Result<f64, LrError> {
        if !self.fitted {
            return Err(LrError::UnfittedState("fraction"));
        }
        let f1 = Self::survival(&self.h1_sorted, score);
        let f2 = Self::survival(&self.h2_sorted, score);
        KdeCalibrator::ratio(f1, f2, score)
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

/// Isotonic calibrator: pool-adjacent-violators over the labels ordered by
/// score, yielding a monotone non-decreasing score-to-posterior step
/// function, interpolated between knots at transform time.
#[derive(Debug, Clone, Default)]
pub struct IsotonicCalibrator {
    // (score, pooled posterior), non-decreasing in both components.
    table: Vec<(f64, f64)>,
    fitted: bool,
}

impl IsotonicCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, score: f64) -> f64 {
        let table = &self.table;
        match table.binary_search_by(|probe| {
            probe.0.partial_cmp(&score).unwrap_or(std::cmp::Ordering::Equal)
        }) {
            Ok(idx) => table[idx].1,
            Err(0) => table[0].1,
            Err(idx) if idx >= table.len() => table[table.len() - 1].1,
            Err(idx) => {
                let (x0, y0) = table[idx - 1];
                let (x1, y1) = table[idx];
                let t = (score - x0) / (x1 - x0);
                y0 + t * (y1 - y0)
            }
        }
    }
}

impl Calibrator for IsotonicCalibrator {
    fn fit(&mut self, pairs: &[LabeledScore]) -> Result<(), LrError> {
        let (h1, h2) = split_by_label(pairs);
        if h1.len() < MIN_SAMPLES_PER_MODEL || h2.len() < MIN_SAMPLES_PER_MODEL {
            return Err(LrError::InsufficientData(format!(
                "isotonic needs at least {MIN_SAMPLES_PER_MODEL} samples per class, got {} and {}",
                h1.len(),
                h2.len()
            )));
        }

        let mut sorted: Vec<(f64, f64)> = pairs
            .iter()
            .map(|p| (p.score, if p.label.is_same_source() { 1.0 } else { 0.0 }))
            .collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        // Pool adjacent violators: (value, weight, count) blocks.
        let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(sorted.len());
        for &(_, y) in &sorted {
            blocks.push((y, 1.0, 1));
            while blocks.len() >= 2 {
                let last = blocks[blocks.len() - 1];
                let prev = blocks[blocks.len() - 2];
                if prev.0 <= last.0 {
                    break;
                }
                let w = prev.1 + last.1;
                let v = (prev.0 * prev.1 + last.0 * last.1) / w;
                let c = prev.2 + last.2;
                blocks.truncate(blocks.len() - 2);
                blocks.push((v, w, c));
            }
        }

        // Clamp pooled posteriors away from 0 and 1 so LRs stay finite.
        let n = sorted.len() as f64;
        let eps = 1.0 / (n + 2.0);

        // Expand block values back over the sorted scores; duplicates keep
        // the last (largest) value so the table stays strictly increasing in
        // score.
        let mut values = Vec::with_capacity(sorted.len());
        for &(v, _, c) in &blocks {
            for _ in 0..c {
                values.push(v.clamp(eps, 1.0 - eps));
            }
        }
        let mut table: Vec<(f64, f64)> = Vec::with_capacity(sorted.len());
        for (&(score, _), &v) in sorted.iter().zip(values.iter()) {
            match table.last_mut() {
                Some(last) if last.0 == score => last.1 = v,
                _ => table.push((score, v)),
            }
        }

        self.table = table;
        self.fitted = true;
        Ok(())
    }

    fn transform(&self, score: f64) -> Result<f64, LrError> {
        if !self.fitted {
            return Err(LrError::UnfittedState("isotonic"));
        }
        let p = self.lookup(score);
        Ok(clamp_lr(p / (1.0 - p)))
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lr_core::Hypothesis;

    fn separable(n: usize) -> Vec<LabeledScore> {
        (0..n)
            .map(|i| LabeledScore::same_source(0.7 + (i % 10) as f64 * 0.02))
            .chain((0..n).map(|i| LabeledScore::different_source(0.2 + (i % 10) as f64 * 0.02)))
            .collect()
    }

    #[test]
    fn dummy_returns_one_for_any_score() {
        let mut cal = DummyCalibrator::new();
        cal.fit(&separable(5)).unwrap();
        for s in [-10.0, 0.0, 0.5, 3.0] {
            assert_eq!(cal.transform(s).unwrap(), 1.0);
        }
    }

    #[test]
    fn unfitted_transform_is_a_state_error() {
        let dummy = DummyCalibrator::new();
        assert_eq!(dummy.transform(0.5).unwrap_err().kind(), "unfitted_state");

        let logit = LogitCalibrator::new();
        assert_eq!(logit.transform(0.5).unwrap_err().kind(), "unfitted_state");

        let kde = KdeCalibrator::new();
        assert_eq!(kde.transform(0.5).unwrap_err().kind(), "unfitted_state");

        let iso = IsotonicCalibrator::new();
        assert_eq!(iso.transform(0.5).unwrap_err().kind(), "unfitted_state");
    }

    #[test]
    fn logit_separates_well_separated_classes() {
        let mut cal = LogitCalibrator::new();
        cal.fit(&separable(50)).unwrap();
        let lr_high = cal.transform(0.8).unwrap();
        let lr_low = cal.transform(0.2).unwrap();
        assert!(lr_high > 1.0, "lr_high = {lr_high}");
        assert!(lr_low < 1.0, "lr_low = {lr_low}");
        assert!(lr_high > 100.0 * lr_low);
    }

    #[test]
    fn logit_requires_both_classes() {
        let mut cal = LogitCalibrator::new();
        let only_h1: Vec<_> = (0..10).map(|i| LabeledScore::same_source(i as f64)).collect();
        assert_eq!(cal.fit(&only_h1).unwrap_err().kind(), "insufficient_data");
    }

    #[test]
    fn logit_weighted_counts_weights() {
        // Duplicate-sample equivalence: weight 2 on a pair must match
        // fitting with that pair repeated.
        let base = separable(10);
        let mut weighted = LogitCalibrator::new();
        let weights: Vec<f64> = base
            .iter()
            .map(|p| if p.label.is_same_source() { 2.0 } else { 1.0 })
            .collect();
        weighted.fit_weighted(&base, &weights).unwrap();

        let mut duplicated = LogitCalibrator::new();
        let mut twice = base.clone();
        twice.extend(base.iter().filter(|p| p.label.is_same_source()).cloned());
        duplicated.fit(&twice).unwrap();

        let (w0, w1) = weighted.coefficients();
        let (d0, d1) = duplicated.coefficients();
        assert!((w0 - d0).abs() < 1e-6 && (w1 - d1).abs() < 1e-6);
    }

    #[test]
    fn kde_lr_ratio_direction() {
        let mut cal = KdeCalibrator::new();
        cal.fit(&separable(50)).unwrap();
        assert!(cal.transform(0.8).unwrap() > 1.0);
        assert!(cal.transform(0.2).unwrap() < 1.0);
    }

    #[test]
    fn kde_out_of_support_far_from_data() {
        let mut cal = KdeCalibrator::with_bandwidth(0.01).unwrap();
        cal.fit(&separable(10)).unwrap();
        // 1e6 is thousands of bandwidths from every sample; both kernels
        // underflow to zero.
        assert!(matches!(cal.transform(1e6), Err(LrError::OutOfSupport(_))));
    }

    #[test]
    fn fraction_neutral_below_all_data_and_capped_above() {
        let mut cal = FractionCalibrator::new();
        cal.fit(&separable(10)).unwrap();
        // Below every sample both survival fractions are 1.
        assert_eq!(cal.transform(-5.0).unwrap(), 1.0);
        // Above every different-source sample but within same-source support.
        assert_eq!(cal.transform(0.75).unwrap(), LR_CAP);
        // Above everything: no empirical footing at all.
        assert!(matches!(cal.transform(5.0), Err(LrError::OutOfSupport(_))));
    }

    #[test]
    fn isotonic_lr_is_non_decreasing_in_score() {
        // Noisy but upward-trending labels.
        let pairs: Vec<LabeledScore> = vec![
            LabeledScore::different_source(0.1),
            LabeledScore::different_source(0.2),
            LabeledScore::same_source(0.25),
            LabeledScore::different_source(0.3),
            LabeledScore::same_source(0.5),
            LabeledScore::different_source(0.55),
            LabeledScore::same_source(0.6),
            LabeledScore::same_source(0.8),
            LabeledScore::same_source(0.9),
        ];
        let mut cal = IsotonicCalibrator::new();
        cal.fit(&pairs).unwrap();

        let grid: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let lrs = cal.transform_all(&grid).unwrap();
        for w in lrs.windows(2) {
            assert!(w[1] >= w[0], "isotonic output decreased: {} -> {}", w[0], w[1]);
        }
        assert!(lrs.iter().all(|lr| lr.is_finite() && *lr > 0.0));
    }

    #[test]
    fn refit_replaces_previous_state() {
        let mut cal = LogitCalibrator::new();
        cal.fit(&separable(50)).unwrap();
        let before = cal.transform(0.8).unwrap();

        // Retrain with the labels flipped; the mapping must invert.
        let flipped: Vec<LabeledScore> = separable(50)
            .into_iter()
            .map(|p| LabeledScore {
                score: p.score,
                label: if p.label.is_same_source() {
                    Hypothesis::DifferentSource
                } else {
                    Hypothesis::SameSource
                },
            })
            .collect();
        cal.fit(&flipped).unwrap();
        let after = cal.transform(0.8).unwrap();
        assert!(before > 1.0 && after < 1.0);
    }
}
