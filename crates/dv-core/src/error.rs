//! Error types for the dv workspace.

use thiserror::Error;

/// Workspace-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error (fatal at initialization)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A named column does not exist in the table
    #[error("unknown column '{0}'")]
    MissingColumn(String),

    /// Row-cursor misuse: never advanced, or advanced past the end
    #[error("row cursor error: {0}")]
    Cursor(String),

    /// A model fit did not converge
    #[error("fit did not converge: {0}")]
    FitFailed(String),

    /// Inputs to the significance statistic are outside its domain
    #[error("invalid significance input: {0}")]
    InvalidSignificance(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
