//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart: {message}")]
    InvalidChart { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A mapping and a non-mapping met at the same key while merging layers
    #[error("Type mismatch at `{path}`: cannot merge {overlay} over {base}")]
    TypeMismatch {
        path: String,
        base: &'static str,
        overlay: &'static str,
    },

    #[error("Invalid values: {message}")]
    InvalidValues { message: String },

    #[error("Invalid release: {message}")]
    InvalidRelease { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
