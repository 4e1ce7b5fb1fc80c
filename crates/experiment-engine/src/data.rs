use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use lr_core::{LabeledScore, LrError};

/// A source of labeled comparison scores.  How the scores were produced
/// (embedding model, distance metric) is upstream territory; the engine only
/// sees the (score, label) pairs.
pub trait DatasetSource: Send + Sync {
    fn id(&self) -> &str;

    fn load(&self) -> Result<Vec<LabeledScore>, LrError>;
}

/// Pairs already in memory, e.g. supplied by an external data loader.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    id: String,
    pairs: Vec<LabeledScore>,
}

impl InMemoryDataset {
    pub fn new(id: impl Into<String>, pairs: Vec<LabeledScore>) -> Self {
        Self { id: id.into(), pairs }
    }
}

impl DatasetSource for InMemoryDataset {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<Vec<LabeledScore>, LrError> {
        Ok(self.pairs.clone())
    }
}

/// Two-normal synthetic dataset: same-source and different-source scores
/// drawn from one Gaussian each, with a fixed seed so loads are
/// reproducible.  Useful as a control dataset and in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticDataset {
    pub id: String,
    pub n_per_class: usize,
    pub same_mean: f64,
    pub same_sd: f64,
    pub diff_mean: f64,
    pub diff_sd: f64,
    pub seed: u64,
}

impl SyntheticDataset {
    /// The spec scenario: 50 + 50 scores from N(0.8, 0.05) and N(0.3, 0.05).
    pub fn well_separated(id: impl Into<String>, seed: u64) -> Self {
        Self {
            id: id.into(),
            n_per_class: 50,
            same_mean: 0.8,
            same_sd: 0.05,
            diff_mean: 0.3,
            diff_sd: 0.05,
            seed,
        }
    }
}

impl DatasetSource for SyntheticDataset {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<Vec<LabeledScore>, LrError> {
        if self.n_per_class < 2 {
            return Err(LrError::InsufficientData(format!(
                "synthetic dataset '{}' needs at least 2 samples per class",
                self.id
            )));
        }
        let same = Normal::new(self.same_mean, self.same_sd).map_err(|e| {
            LrError::ConfigurationError(format!("same-source distribution: {e}"))
        })?;
        let diff = Normal::new(self.diff_mean, self.diff_sd).map_err(|e| {
            LrError::ConfigurationError(format!("different-source distribution: {e}"))
        })?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut pairs = Vec::with_capacity(2 * self.n_per_class);
        for _ in 0..self.n_per_class {
            pairs.push(LabeledScore::same_source(rand::Rng::sample(&mut rng, same)));
        }
        for _ in 0..self.n_per_class {
            pairs.push(LabeledScore::different_source(rand::Rng::sample(&mut rng, diff)));
        }
        Ok(pairs)
    }
}
