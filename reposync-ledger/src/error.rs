//! Error types for reposync-ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading or writing the ledger document.
///
/// [`crate::Ledger`] never propagates these out of its mutation path; they are
/// surfaced only by the strict [`crate::Ledger::read`] and [`crate::Ledger::save`].
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document was not a JSON object of name → bool.
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`LedgerError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.into(),
        source,
    }
}
