//! Error types for the HARHN library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, HarhnError>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum HarhnError {
    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Runtime tensor does not match the configured widths
    #[error("Shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        got: String,
    },

    /// Not enough rows to build a window or batch statistics
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Array could not be reshaped
    #[error("Array shape error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// TOML configuration could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// TOML configuration could not be written
    #[error("Failed to write configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

impl HarhnError {
    /// Build a shape mismatch error from two shapes
    pub fn shape(context: &'static str, expected: &[usize], got: &[usize]) -> Self {
        HarhnError::ShapeMismatch {
            context,
            expected: format!("{:?}", expected),
            got: format!("{:?}", got),
        }
    }

    /// Whether this error was raised by configuration validation
    pub fn is_config_error(&self) -> bool {
        matches!(self, HarhnError::InvalidConfig(_))
    }
}
