//! Score-to-LR calibration.
//!
//! Implements the calibrator family (dummy, logit, KDE, fraction, isotonic),
//! the wrapper family (ELUB bounding, normalization, class balancing) and the
//! catalog that maps configuration names to constructed calibrator stacks.

pub mod calibrators;
pub mod catalog;
pub mod density;
pub mod wrappers;

pub use calibrators::*;
pub use catalog::*;
pub use density::*;
pub use wrappers::*;
