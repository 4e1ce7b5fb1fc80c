use serde::{Deserialize, Serialize};

use calibration::{CalibratorKind, CalibratorParams};
use lr_core::LrError;

use crate::data::DatasetSource;

/// One calibrator entry in a plan: catalog name plus hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratorConfig {
    pub name: CalibratorKind,
    #[serde(flatten)]
    pub params: CalibratorParams,
}

impl CalibratorConfig {
    pub fn new(name: CalibratorKind) -> Self {
        Self { name, params: CalibratorParams::default() }
    }

    /// Row identifier for the results table, e.g. `KDE(h=0.02)`.
    pub fn id(&self) -> String {
        match self.params.kde_bandwidth {
            Some(h) => format!("{}(h={h})", self.name),
            None => self.name.to_string(),
        }
    }
}

/// An experiment plan: the axes of the grid plus split/resampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub calibrators: Vec<CalibratorConfig>,
    /// Bootstrap-style repeats; each repeat redraws the train/test split.
    #[serde(default = "default_repeats")]
    pub repeats: u32,
    #[serde(default = "default_fraction_test")]
    pub fraction_test: f64,
    #[serde(default)]
    pub base_seed: u64,
}

fn default_repeats() -> u32 {
    1
}

fn default_fraction_test() -> f64 {
    0.2
}

/// One fully-resolved experiment unit, ready to run.
#[derive(Debug, Clone)]
pub struct ExperimentSpec {
    pub dataset_idx: usize,
    pub dataset_id: String,
    pub calibrator: CalibratorConfig,
    pub repeat: u32,
    /// Seed for the train/test split, derived from (base seed, dataset,
    /// repeat) only, so every calibrator within one repeat sees the same
    /// split and reruns are bit-identical.
    pub split_seed: u64,
}

/// Expand a plan over the dataset sources into the ordered Cartesian
/// product.  All configuration is validated here, before any unit runs: a
/// malformed plan fails the whole run, not one row.
pub fn expand_plan(
    plan: &ExperimentPlan,
    sources: &[Box<dyn DatasetSource>],
) -> Result<Vec<ExperimentSpec>, LrError> {
    if sources.is_empty() {
        return Err(LrError::ConfigurationError("plan has no datasets".to_string()));
    }
    if plan.calibrators.is_empty() {
        return Err(LrError::ConfigurationError("plan has no calibrators".to_string()));
    }
    if plan.repeats == 0 {
        return Err(LrError::ConfigurationError("repeats must be at least 1".to_string()));
    }
    if !(plan.fraction_test > 0.0 && plan.fraction_test < 1.0) {
        return Err(LrError::ConfigurationError(format!(
            "fraction_test must lie in (0, 1), got {}",
            plan.fraction_test
        )));
    }
    for config in &plan.calibrators {
        config.params.validate(config.name)?;
    }

    let mut specs = Vec::with_capacity(sources.len() * plan.calibrators.len() * plan.repeats as usize);
    for (dataset_idx, source) in sources.iter().enumerate() {
        for config in &plan.calibrators {
            for repeat in 0..plan.repeats {
                specs.push(ExperimentSpec {
                    dataset_idx,
                    dataset_id: source.id().to_string(),
                    calibrator: config.clone(),
                    repeat,
                    split_seed: derive_seed(plan.base_seed, dataset_idx as u64, repeat as u64),
                });
            }
        }
    }
    Ok(specs)
}

/// Mix the grid coordinates into a per-unit seed (splitmix64 finalizer).
fn derive_seed(base: u64, dataset: u64, repeat: u64) -> u64 {
    let mut z = base
        .wrapping_add(dataset.wrapping_mul(0x9e3779b97f4a7c15))
        .wrapping_add(repeat.wrapping_mul(0xbf58476d1ce4e5b9));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticDataset;

    fn sources() -> Vec<Box<dyn DatasetSource>> {
        vec![
            Box::new(SyntheticDataset::well_separated("a", 1)),
            Box::new(SyntheticDataset::well_separated("b", 2)),
        ]
    }

    fn plan() -> ExperimentPlan {
        ExperimentPlan {
            calibrators: vec![
                CalibratorConfig::new(CalibratorKind::Dummy),
                CalibratorConfig::new(CalibratorKind::Logit),
                CalibratorConfig::new(CalibratorKind::Kde),
            ],
            repeats: 4,
            fraction_test: 0.25,
            base_seed: 7,
        }
    }

    #[test]
    fn expansion_is_the_ordered_cartesian_product() {
        let specs = expand_plan(&plan(), &sources()).unwrap();
        assert_eq!(specs.len(), 2 * 3 * 4);
        assert_eq!(specs[0].dataset_id, "a");
        assert_eq!(specs[0].calibrator.name, CalibratorKind::Dummy);
        assert_eq!(specs[0].repeat, 0);
        assert_eq!(specs[11].dataset_id, "a");
        assert_eq!(specs[12].dataset_id, "b");
    }

    #[test]
    fn split_seed_is_shared_across_calibrators_within_a_repeat() {
        let specs = expand_plan(&plan(), &sources()).unwrap();
        let dummy_r0 = &specs[0];
        let logit_r0 = specs
            .iter()
            .find(|s| s.dataset_id == "a" && s.calibrator.name == CalibratorKind::Logit && s.repeat == 0)
            .unwrap();
        assert_eq!(dummy_r0.split_seed, logit_r0.split_seed);

        let dummy_r1 = specs.iter().find(|s| s.dataset_id == "a" && s.repeat == 1).unwrap();
        assert_ne!(dummy_r0.split_seed, dummy_r1.split_seed);
    }

    #[test]
    fn invalid_plans_fail_fast() {
        let mut p = plan();
        p.repeats = 0;
        assert_eq!(expand_plan(&p, &sources()).unwrap_err().kind(), "configuration_error");

        let mut p = plan();
        p.fraction_test = 0.0;
        assert_eq!(expand_plan(&p, &sources()).unwrap_err().kind(), "configuration_error");

        let mut p = plan();
        p.calibrators[1].params.kde_bandwidth = Some(-2.0);
        assert_eq!(expand_plan(&p, &sources()).unwrap_err().kind(), "configuration_error");

        assert_eq!(expand_plan(&plan(), &[]).unwrap_err().kind(), "configuration_error");
    }

    #[test]
    fn calibrator_names_parse_from_json() {
        let json = r#"{"calibrators": [{"name": "elub_KDE", "kde_bandwidth": 0.05}], "repeats": 2}"#;
        let plan: ExperimentPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.calibrators[0].name, CalibratorKind::ElubKde);
        assert_eq!(plan.calibrators[0].params.kde_bandwidth, Some(0.05));
        assert_eq!(plan.fraction_test, 0.2);

        let bad = r#"{"calibrators": [{"name": "nope"}]}"#;
        assert!(serde_json::from_str::<ExperimentPlan>(bad).is_err());
    }
}
