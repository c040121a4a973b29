//! Error types for Strata
//!
//! This module defines the error type shared by the engine and the
//! randomized harness. We use `thiserror` for automatic `Display` and
//! `Error` trait implementations.
//!
//! The harness never introduces its own recoverable errors: engine failures
//! travel through it unchanged, so a single enum covers the whole workspace.

use std::io;
use thiserror::Error;

/// Result type alias for Strata operations
pub type StrataResult<T> = std::result::Result<T, StrataError>;

/// Error types for Strata
#[derive(Debug, Error)]
pub enum StrataError {
    /// I/O error (directory files, manifests)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (bad magic, checksum mismatch)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Caller passed an argument the engine cannot honor
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No commit exists in the directory
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Another writer holds the directory's write lock
    #[error("Lock obtain failed: {0}")]
    LockObtainFailed(String),

    /// Operation attempted on a writer that has already been closed
    #[error("Writer is closed")]
    Closed,

    /// Invalid harness or engine configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StrataError {
    /// Shorthand for [`StrataError::InvalidInput`].
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        StrataError::InvalidInput(msg.into())
    }

    /// Shorthand for [`StrataError::Corruption`].
    pub fn corruption(msg: impl Into<String>) -> Self {
        StrataError::Corruption(msg.into())
    }

    /// Shorthand for [`StrataError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        StrataError::Config(msg.into())
    }
}

impl From<rmp_serde::encode::Error> for StrataError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StrataError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StrataError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StrataError::Serialization(e.to_string())
    }
}
