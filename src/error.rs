//! Error types for the walk-forward engine.

use thiserror::Error;

/// Main error type for the walk-forward engine.
#[derive(Error, Debug)]
pub enum WalkForwardError {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Insufficient data: required {required} rows, available {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Fold {fold} failed: {cause}")]
    FoldFailed { fold: usize, cause: String },

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl WalkForwardError {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        WalkForwardError::ConfigError(msg.into())
    }

    /// Shorthand for a model error.
    pub fn model(msg: impl Into<String>) -> Self {
        WalkForwardError::ModelError(msg.into())
    }

    /// Whether the error should abort a run before any computation happens.
    ///
    /// Per-fold failures are absorbed by the orchestrator instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            WalkForwardError::FoldFailed { .. } | WalkForwardError::ModelError(_)
        )
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, WalkForwardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WalkForwardError::InsufficientData {
            required: 200,
            available: 120,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: required 200 rows, available 120"
        );

        let err = WalkForwardError::config("test_fraction must be in (0, 1)");
        assert!(err.to_string().starts_with("Invalid configuration"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(WalkForwardError::config("bad").is_fatal());
        assert!(!WalkForwardError::model("singular").is_fatal());
        assert!(!WalkForwardError::FoldFailed {
            fold: 2,
            cause: "nan".to_string()
        }
        .is_fatal());
    }
}
