//! Error types for the mirroring library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for mirroring operations.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Configuration error (invalid YAML, missing fields, empty schema selection, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A catalog or row query failed, or a connection could not be opened
    #[error("Load failed: {message}\n  Context: {context}")]
    Load { context: String, message: String },

    /// Snapshot document is missing, malformed, or fails verification
    #[error("Snapshot error in {}: {message}", path.display())]
    Snapshot { path: PathBuf, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MirrorError {
    /// Create a Load error with context about where it occurred
    pub fn load(context: impl Into<String>, message: impl ToString) -> Self {
        MirrorError::Load {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a Snapshot error for the given document
    pub fn snapshot(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MirrorError::Snapshot {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MirrorError::Config(_) | MirrorError::Yaml(_) => 1,
            MirrorError::Load { .. } => 2,
            MirrorError::Snapshot { .. } => 3,
            MirrorError::Json(_) => 4,
            MirrorError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<tiberius::error::Error> for MirrorError {
    fn from(e: tiberius::error::Error) -> Self {
        MirrorError::load("SQL Server", e)
    }
}

/// Result type alias for mirroring operations.
pub type Result<T> = std::result::Result<T, MirrorError>;
