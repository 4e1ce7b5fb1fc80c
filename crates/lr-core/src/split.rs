use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::{split_by_label, LabeledScore, LrError};

/// Train/test partition of one dataset.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: Vec<LabeledScore>,
    pub test: Vec<LabeledScore>,
}

/// Stratified shuffled split: each class is shuffled independently with a
/// seeded RNG and `fraction_test` of it goes to the test partition, so both
/// hypotheses stay represented on both sides.  Deterministic for a fixed
/// seed.
pub fn train_test_split(
    pairs: &[LabeledScore],
    fraction_test: f64,
    seed: u64,
) -> Result<TrainTestSplit, LrError> {
    if !(fraction_test > 0.0 && fraction_test < 1.0) {
        return Err(LrError::ConfigurationError(format!(
            "fraction_test must lie in (0, 1), got {fraction_test}"
        )));
    }
    let (h1, h2) = split_by_label(pairs);
    if h1.len() < 2 || h2.len() < 2 {
        return Err(LrError::InsufficientData(format!(
            "need at least 2 samples per class to split, got {} same-source and {} different-source",
            h1.len(),
            h2.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    let partitions: [(Vec<f64>, fn(f64) -> LabeledScore); 2] = [
        (h1, LabeledScore::same_source),
        (h2, LabeledScore::different_source),
    ];
    for (scores, make) in partitions {
        let mut scores = scores;
        scores.shuffle(&mut rng);
        // At least one sample of each class on each side.
        let n_test = ((scores.len() as f64 * fraction_test).round() as usize)
            .clamp(1, scores.len() - 1);
        for (i, s) in scores.into_iter().enumerate() {
            if i < n_test {
                test.push(make(s));
            } else {
                train.push(make(s));
            }
        }
    }
    Ok(TrainTestSplit { train, test })
}
