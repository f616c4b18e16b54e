use burn::{config::ConfigError, record::RecorderError};
use thiserror::Error;

/// Error type for the experiment pipeline.
#[derive(Error, Debug)]
pub enum ExperimentError {
    /// Filesystem error while writing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A saved configuration could not be read back.
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),

    /// A trained model could not be recorded.
    #[error("failed to save model: {0}")]
    Record(#[from] RecorderError),

    /// An image could not be encoded or written.
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),

    /// A JSON artifact could not be serialized.
    #[error("failed to serialize artifact: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation needs at least one item.
    #[error("dataset `{0}` is empty")]
    EmptyDataset(&'static str),

    /// Two collections that must line up do not.
    #[error("length mismatch: expected {expected} items, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, ExperimentError>;
