//! Error types for database and upload operations.
//!
//! Library functions return [`Result`]; the `ordb` binary wraps these in
//! `anyhow` at the command boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong talking to the document store or reading
/// the local files that get attached to it.
#[derive(Debug, Error)]
pub enum DbError {
    /// The connection parameters name a database type with no registered backend.
    #[error("unsupported database type: '{0}' (supported: CouchDB)")]
    UnsupportedBackend(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mesh or material file lacks the directive pointing at its companion file.
    #[error("no '{directive}' reference found in {}", path.display())]
    MissingReference {
        directive: &'static str,
        path: PathBuf,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// CouchDB answered with a non-success status.
    #[error("server returned {status}: {error} ({reason})")]
    Server {
        status: u16,
        error: String,
        reason: String,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("document not found: {0}")]
    NotFound(String),
}

impl DbError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DbError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the server reported a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::Server { status: 404, .. } | DbError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
