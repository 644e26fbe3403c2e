//! Runtime error types.

use matcha_core::{FileError, StoreError};
use thiserror::Error;

use crate::config::{ConfigError, TransportKind};

/// Errors that can occur while building or driving the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Seeding or reading the store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The file cache directory could not be prepared.
    #[error("File cache error: {0}")]
    File(#[from] FileError),

    /// The configured transport was compiled out.
    #[error("Transport '{0}' is not available in this build")]
    TransportUnavailable(TransportKind),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
