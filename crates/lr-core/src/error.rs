use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LrError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Calibrator used before fit: {0}")]
    UnfittedState(&'static str),

    #[error("Score {0} outside calibrator support")]
    OutOfSupport(f64),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LrError {
    /// Stable short name, recorded on failed experiment rows.
    pub fn kind(&self) -> &'static str {
        match self {
            LrError::InsufficientData(_) => "insufficient_data",
            LrError::UnfittedState(_) => "unfitted_state",
            LrError::OutOfSupport(_) => "out_of_support",
            LrError::ConfigurationError(_) => "configuration_error",
        }
    }
}
