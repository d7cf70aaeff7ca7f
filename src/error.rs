//! Error types for schema emission

use thiserror::Error;

/// Result type for emission operations
pub type Result<T> = std::result::Result<T, EmitError>;

/// Emission engine errors
///
/// Structural errors (`UnresolvedRef`, `UnsupportedRef`, `InvalidSchema`) abort
/// a single generation job. Configuration errors (`EmptyBatch`,
/// `InvalidPattern`, `InvalidFormat`, `InvalidOption`) abort before any job
/// runs when they are batch-scoped, or fail only the affected job otherwise.
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("Unresolved reference to schema '{name}' in {schema} at {path}")]
    UnresolvedRef {
        name: String,
        schema: String,
        path: String,
    },

    #[error("Unsupported $ref '{reference}' (only local component references are supported)")]
    UnsupportedRef { reference: String },

    #[error("Invalid schema at {location}: {message}")]
    InvalidSchema { location: String, message: String },

    #[error("Batch job list is empty")]
    EmptyBatch,

    #[error("Invalid glob pattern: {pattern}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Invalid pattern for custom format '{format}': {pattern}")]
    InvalidFormat {
        format: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl EmitError {
    /// True for errors caused by the input document rather than by options
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedRef { .. } | Self::UnsupportedRef { .. } | Self::InvalidSchema { .. }
        )
    }
}
