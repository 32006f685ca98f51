//! Error kinds for calls against the source and destination forges.

use thiserror::Error;

use crate::http::HttpError;

#[derive(Debug, Error)]
pub enum ForgeError {
    /// Source API unreachable, non-success, or malformed. Aborts one cycle.
    #[error("source fetch failed{}: {detail}", status_label(.status))]
    SourceFetch { status: Option<u16>, detail: String },

    /// Destination identity lookup failed. Aborts one repository's create.
    #[error("destination identity lookup failed with status {status}: {body}")]
    DestinationAuth { status: u16, body: String },

    /// The migration call returned anything other than `201 Created`.
    #[error("creating mirror for {name} failed with status {status}: {body}")]
    MirrorCreate {
        name: String,
        status: u16,
        body: String,
    },

    /// Cancellation fired while waiting for a rate-limiter token.
    #[error("rate limit exceeded: cancelled while waiting for a source API token")]
    RateLimitExceeded,

    /// Cancellation fired while a remote call was in flight.
    #[error("remote call cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] HttpError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {code}"),
        None => String::new(),
    }
}
