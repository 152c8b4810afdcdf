use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Source directory is missing or is not a directory.
    #[error("Source directory not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// One or more external encoders are not installed.
    #[error("Missing required tools, please install {}", tools.join(", "))]
    MissingDependency { tools: Vec<String> },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Failed to write catalog {}: {source}", path.display())]
    CatalogWrite {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A probe could not tell what a file really is.
///
/// Recoverable: the file is kept and treated as needing conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to probe {}: {cause}", path.display())]
pub struct ProbeError {
    pub path: PathBuf,
    pub cause: String,
}

impl ProbeError {
    pub fn new(path: impl Into<PathBuf>, cause: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cause: cause.into(),
        }
    }
}

/// An encoder failed on a single job. Recoverable: the batch continues.
#[derive(Debug, Clone, Error)]
#[error("Failed to convert {}: {reason}", path.display())]
pub struct ConversionError {
    pub path: PathBuf,
    pub reason: String,
    pub stderr: Option<String>,
}

impl ConversionError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
            stderr,
        }
    }
}
