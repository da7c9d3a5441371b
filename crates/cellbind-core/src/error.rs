//! Error types for cellbind-core.

use thiserror::Error;

use crate::spawn::BuildError;

/// Result type for cellbind-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cellbind-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A build step failed to launch or exited with an error.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Invalid configuration value (e.g. an unknown capture mode).
    #[error("configuration error: {0}")]
    Config(String),

    /// The host environment could not provide a required value.
    #[error("environment error: {0}")]
    Environment(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
