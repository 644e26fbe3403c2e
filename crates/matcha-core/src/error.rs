//! Unified error types for the Matcha core.
//!
//! Protocol-level failures that must reach the wire as an action response
//! live in [`crate::action`]; everything here describes failures inside the
//! simulator itself.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// No live connection to send on.
    #[error("not connected")]
    NotConnected,

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Frame could not be encoded or decoded.
    #[error("frame codec error: {0}")]
    Codec(String),

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors raised while converting between canonical and wire shapes.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The wire protocol has a segment for this element but it is not wired up.
    #[error("segment not implemented: {0}")]
    NotImplemented(&'static str),

    /// The element is malformed.
    #[error("malformed element: {0}")]
    Malformed(String),

    /// A referenced file could not be resolved.
    #[error(transparent)]
    File(#[from] FileError),

    /// A store lookup failed during enrichment.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors reported by a [`crate::store::Store`] implementation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The record already exists.
    #[error("{kind} '{key}' already exists")]
    Duplicate {
        /// Record kind.
        kind: &'static str,
        /// Record key.
        key: String,
    },

    /// The record was expected but is missing.
    #[error("{kind} '{key}' not found")]
    Missing {
        /// Record kind.
        kind: &'static str,
        /// Record key.
        key: String,
    },

    /// Backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

// =============================================================================
// File Errors
// =============================================================================

/// Errors reported by a [`crate::files::FileCache`] implementation.
#[derive(Debug, Clone, Error)]
pub enum FileError {
    /// No cached file with this id.
    #[error("file '{0}' not found")]
    NotFound(String),

    /// The file source string is not a recognized form.
    #[error("invalid file source: {0}")]
    InvalidSource(String),

    /// The content does not match the expected checksum.
    #[error("sha256 mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// Fragment set is incomplete or inconsistent.
    #[error("fragment error: {0}")]
    Fragment(String),

    /// Remote download failed.
    #[error("download failed: {0}")]
    Download(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FileError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<StoreError> for FileError {
    fn from(err: StoreError) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for file cache operations.
pub type FileResult<T> = Result<T, FileError>;
