use crate::{LabeledScore, LrError};

/// A score-to-likelihood-ratio calibrator.
///
/// Lifecycle: constructed unfitted, `fit` replaces all previous state,
/// `transform` is only valid once fitted.  Wrappers hold a
/// `Box<dyn Calibrator>` and stack one layer at a time, so composition order
/// is explicit.
pub trait Calibrator: Send + Sync {
    /// Estimate the calibration mapping from labeled training scores.
    fn fit(&mut self, pairs: &[LabeledScore]) -> Result<(), LrError>;

    /// Fit with one weight per sample.  Only calibrators whose estimator has
    /// a native notion of sample weight implement this; the default refuses
    /// rather than silently ignoring the weights.
    fn fit_weighted(&mut self, _pairs: &[LabeledScore], _weights: &[f64]) -> Result<(), LrError> {
        Err(LrError::ConfigurationError(
            "this calibrator does not support weighted fitting".to_string(),
        ))
    }

    /// Map one raw score to a likelihood ratio.
    ///
    /// Returns `UnfittedState` before `fit`, `OutOfSupport` where both
    /// hypothesis densities vanish; every Ok value is strictly positive and
    /// finite.
    fn transform(&self, score: f64) -> Result<f64, LrError>;

    fn is_fitted(&self) -> bool;

    fn transform_all(&self, scores: &[f64]) -> Result<Vec<f64>, LrError> {
        scores.iter().map(|&s| self.transform(s)).collect()
    }
}

impl std::fmt::Debug for dyn Calibrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Calibrator")
    }
}
