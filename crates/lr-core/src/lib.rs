pub mod calibrator;
pub mod error;
pub mod split;
pub mod types;

pub use calibrator::*;
pub use error::*;
pub use split::*;
pub use types::*;
