//! Error types for velotune

use thiserror::Error;

/// Result type alias for velotune operations
pub type Result<T> = std::result::Result<T, VelotuneError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum VelotuneError {
    #[error("Invalid split fraction: {0} (must be strictly between 0 and 1)")]
    InvalidFraction(f64),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Degenerate column: {0} has zero standard deviation")]
    DegenerateColumn(String),

    #[error("Unsupported mode: {family} does not support {mode}")]
    UnsupportedMode { family: String, mode: String },

    #[error("Invalid fold count: {folds} folds for {rows} rows")]
    InvalidFoldCount { folds: usize, rows: usize },

    #[error("Fit failure: {0}")]
    FitFailure(String),

    #[error("Score failure: {0}")]
    ScoreFailure(String),

    #[error("No usable result: {0}")]
    NoUsableResult(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl VelotuneError {
    /// True for errors that indicate a caller mistake rather than a data condition.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VelotuneError::InvalidFraction(_)
                | VelotuneError::UnknownColumn(_)
                | VelotuneError::InvalidFoldCount { .. }
                | VelotuneError::UnsupportedMode { .. }
                | VelotuneError::ConfigError(_)
                | VelotuneError::InvalidParameter { .. }
        )
    }
}

impl From<polars::error::PolarsError> for VelotuneError {
    fn from(err: polars::error::PolarsError) -> Self {
        VelotuneError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for VelotuneError {
    fn from(err: serde_json::Error) -> Self {
        VelotuneError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for VelotuneError {
    fn from(err: bincode::Error) -> Self {
        VelotuneError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for VelotuneError {
    fn from(err: ndarray::ShapeError) -> Self {
        VelotuneError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
