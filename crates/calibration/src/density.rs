use lr_core::LrError;

/// Minimum samples a density model needs before fitting is meaningful.
pub const MIN_SAMPLES_PER_MODEL: usize = 2;

/// A univariate density estimated from an unordered multiset of scores.
pub trait DensityModel: Send + Sync {
    fn fit(&mut self, scores: &[f64]) -> Result<(), LrError>;

    /// Estimated likelihood at `x`; always `>= 0`, `0` outside support.
    fn density(&self, x: f64) -> f64;
}

/// Gaussian kernel density estimate.
///
/// Bandwidth follows Silverman's rule, `0.9 * min(sd, iqr / 1.34) * n^-1/5`,
/// unless an override is supplied at construction.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    bandwidth_override: Option<f64>,
    bandwidth: f64,
    samples: Vec<f64>,
}

impl GaussianKde {
    pub fn new() -> Self {
        Self { bandwidth_override: None, bandwidth: 0.0, samples: Vec::new() }
    }

    pub fn with_bandwidth(bandwidth: f64) -> Result<Self, LrError> {
        if !(bandwidth > 0.0) || !bandwidth.is_finite() {
            return Err(LrError::ConfigurationError(format!(
                "KDE bandwidth must be positive and finite, got {bandwidth}"
            )));
        }
        Ok(Self { bandwidth_override: Some(bandwidth), bandwidth: 0.0, samples: Vec::new() })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    fn silverman(scores: &[f64]) -> f64 {
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let sd = var.sqrt();

        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let q = |p: f64| -> f64 {
            let idx = (p * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        let iqr = q(0.75) - q(0.25);

        let spread = if iqr > 0.0 { sd.min(iqr / 1.34) } else { sd };
        let h = 0.9 * spread * n.powf(-0.2);
        // All-identical samples give zero spread; keep the kernel proper.
        if h.is_finite() && h > 0.0 { h } else { 1e-6 }
    }
}

impl Default for GaussianKde {
    fn default() -> Self {
        Self::new()
    }
}

impl DensityModel for GaussianKde {
    fn fit(&mut self, scores: &[f64]) -> Result<(), LrError> {
        if scores.len() < MIN_SAMPLES_PER_MODEL {
            return Err(LrError::InsufficientData(format!(
                "KDE needs at least {MIN_SAMPLES_PER_MODEL} samples, got {}",
                scores.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(LrError::ConfigurationError(
                "KDE training scores must be finite".to_string(),
            ));
        }
        self.samples = scores.to_vec();
        self.bandwidth = match self.bandwidth_override {
            Some(h) => h,
            None => Self::silverman(scores),
        };
        Ok(())
    }

    fn density(&self, x: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let h = self.bandwidth;
        let norm = 1.0 / ((2.0 * std::f64::consts::PI).sqrt() * h * self.samples.len() as f64);
        self.samples
            .iter()
            .map(|s| {
                let u = (x - s) / h;
                (-0.5 * u * u).exp()
            })
            .sum::<f64>()
            * norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kde_integrates_to_roughly_one() {
        let mut kde = GaussianKde::new();
        kde.fit(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();

        // Trapezoid over a generous window.
        let (lo, hi, steps) = (-2.0, 3.0, 5000);
        let dx = (hi - lo) / steps as f64;
        let integral: f64 = (0..steps)
            .map(|i| kde.density(lo + (i as f64 + 0.5) * dx) * dx)
            .sum();
        assert!((integral - 1.0).abs() < 0.01, "integral = {integral}");
    }

    #[test]
    fn kde_density_peaks_near_data() {
        let mut kde = GaussianKde::new();
        kde.fit(&[0.5, 0.51, 0.49, 0.5, 0.52, 0.48]).unwrap();
        assert!(kde.density(0.5) > kde.density(0.9));
        assert!(kde.density(0.5) > kde.density(0.1));
    }

    #[test]
    fn kde_bandwidth_override_wins() {
        let mut kde = GaussianKde::with_bandwidth(0.25).unwrap();
        kde.fit(&[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(kde.bandwidth(), 0.25);
    }

    #[test]
    fn kde_rejects_nonpositive_bandwidth() {
        assert!(GaussianKde::with_bandwidth(0.0).is_err());
        assert!(GaussianKde::with_bandwidth(-1.0).is_err());
    }

    #[test]
    fn kde_rejects_tiny_sample() {
        let mut kde = GaussianKde::new();
        let err = kde.fit(&[0.5]).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn kde_degenerate_spread_stays_finite() {
        let mut kde = GaussianKde::new();
        kde.fit(&[0.5, 0.5, 0.5]).unwrap();
        assert!(kde.density(0.5).is_finite());
        assert!(kde.density(0.5) > 0.0);
    }
}
