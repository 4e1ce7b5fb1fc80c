use std::str::FromStr;

use serde::{Deserialize, Serialize};

use lr_core::{Calibrator, LrError};

use crate::calibrators::{
    DummyCalibrator, FractionCalibrator, IsotonicCalibrator, KdeCalibrator, LogitCalibrator,
};
use crate::wrappers::{ClassBalancer, ElubBounder, NormalizedCalibrator};

/// The enumerated calibrator catalog.  Unknown names fail at parse time with
/// a `ConfigurationError`, before any fitting begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CalibratorKind {
    Dummy,
    Logit,
    LogitNormalized,
    LogitUnweighted,
    Kde,
    ElubKde,
    Elub,
    Fraction,
    Isotonic,
}

impl CalibratorKind {
    pub const ALL: [CalibratorKind; 9] = [
        CalibratorKind::Dummy,
        CalibratorKind::Logit,
        CalibratorKind::LogitNormalized,
        CalibratorKind::LogitUnweighted,
        CalibratorKind::Kde,
        CalibratorKind::ElubKde,
        CalibratorKind::Elub,
        CalibratorKind::Fraction,
        CalibratorKind::Isotonic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CalibratorKind::Dummy => "dummy",
            CalibratorKind::Logit => "logit",
            CalibratorKind::LogitNormalized => "logit_normalized",
            CalibratorKind::LogitUnweighted => "logit_unweighted",
            CalibratorKind::Kde => "KDE",
            CalibratorKind::ElubKde => "elub_KDE",
            CalibratorKind::Elub => "elub",
            CalibratorKind::Fraction => "fraction",
            CalibratorKind::Isotonic => "isotonic",
        }
    }

    fn uses_kde(self) -> bool {
        matches!(self, CalibratorKind::Kde | CalibratorKind::ElubKde)
    }
}

impl FromStr for CalibratorKind {
    type Err = LrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| LrError::ConfigurationError(format!("unknown calibrator name '{s}'")))
    }
}

impl TryFrom<String> for CalibratorKind {
    type Error = LrError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CalibratorKind> for String {
    fn from(kind: CalibratorKind) -> Self {
        kind.name().to_string()
    }
}

impl std::fmt::Display for CalibratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional hyperparameters for catalog entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibratorParams {
    /// Fixed KDE bandwidth overriding Silverman's rule.  Only meaningful for
    /// the KDE-backed entries.
    #[serde(default)]
    pub kde_bandwidth: Option<f64>,
}

impl CalibratorParams {
    pub fn validate(&self, kind: CalibratorKind) -> Result<(), LrError> {
        if let Some(h) = self.kde_bandwidth {
            if !(h > 0.0) || !h.is_finite() {
                return Err(LrError::ConfigurationError(format!(
                    "KDE bandwidth must be positive and finite, got {h}"
                )));
            }
            if !kind.uses_kde() {
                return Err(LrError::ConfigurationError(format!(
                    "kde_bandwidth is not a parameter of calibrator '{kind}'"
                )));
            }
        }
        Ok(())
    }
}

/// Build a fresh, unfitted calibrator stack for a catalog entry.
pub fn build_calibrator(
    kind: CalibratorKind,
    params: &CalibratorParams,
) -> Result<Box<dyn Calibrator>, LrError> {
    params.validate(kind)?;
    let kde = || -> Result<KdeCalibrator, LrError> {
        match params.kde_bandwidth {
            Some(h) => KdeCalibrator::with_bandwidth(h),
            None => Ok(KdeCalibrator::new()),
        }
    };
    let balanced_logit = || ClassBalancer::balanced(Box::new(LogitCalibrator::new()));

    Ok(match kind {
        CalibratorKind::Dummy => Box::new(DummyCalibrator::new()),
        CalibratorKind::Logit => Box::new(balanced_logit()),
        CalibratorKind::LogitUnweighted => Box::new(LogitCalibrator::new()),
        CalibratorKind::LogitNormalized => {
            Box::new(NormalizedCalibrator::new(Box::new(balanced_logit())))
        }
        CalibratorKind::Kde => Box::new(kde()?),
        CalibratorKind::ElubKde => Box::new(ElubBounder::new(Box::new(kde()?))),
        CalibratorKind::Elub => Box::new(ElubBounder::new(Box::new(balanced_logit()))),
        CalibratorKind::Fraction => Box::new(FractionCalibrator::new()),
        CalibratorKind::Isotonic => Box::new(IsotonicCalibrator::new()),
    })
}
