//! Sync error handling
//!
//! Provides typed errors for the conversion/upsert pipeline, classified the
//! way the run loop needs them:
//!
//! - transient errors are retried by [`crate::retry`]
//! - fatal errors abort the whole run
//! - everything else aborts only the document being synchronized
//!
//! Markdown conversion never fails, so there is no conversion variant.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while synchronizing documents
#[derive(Error, Debug)]
pub enum SyncError {
    /// Document is missing a title or slug
    #[error("Invalid document: {0}")]
    Validation(String),

    /// Front matter could not be parsed
    #[error("Invalid front matter: {details}")]
    FrontMatter { details: String },

    /// The store asked us to slow down
    #[error("Rate limited by remote store")]
    RateLimited { retry_after: Option<Duration> },

    /// Network blip or server-side failure worth retrying
    #[error("Transient remote error: {0}")]
    Transient(String),

    /// The store refused this particular request
    #[error("Remote store rejected request ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    /// Authentication failure or missing collection; no document can succeed
    #[error("Remote store unavailable: {0}")]
    Permanent(String),

    /// A property value is not allowed by the remote schema
    #[error("Value '{value}' is not an allowed option for '{property}'")]
    SchemaMismatch { property: String, value: String },

    /// Failed to read or write a local file
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Ledger file exists but cannot be used
    #[error("Ledger at '{path}' is unreadable: {details}")]
    Ledger { path: PathBuf, details: String },

    /// File system watcher could not be started
    #[error("Cannot watch '{path}': {details}")]
    Watch { path: PathBuf, details: String },

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Attach a path to an I/O error
    pub fn from_io(error: io::Error, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            path: path.into(),
            source: error,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimited { .. } | SyncError::Transient(_)
        )
    }

    /// Whether this error should abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Permanent(_))
    }

    /// Server-provided delay before retrying, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            SyncError::Rejected {
                status: error.status().map(|s| s.as_u16()).unwrap_or(0),
                code: "invalid_response".to_string(),
                message: error.to_string(),
            }
        } else {
            // Connect failures, timeouts and dropped bodies are all worth a retry
            SyncError::Transient(error.to_string())
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
