//! Error types for the voting client.

use crate::models::SiteId;
use thiserror::Error;

/// Result type for voting client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while casting or hydrating votes.
#[derive(Debug, Error)]
pub enum Error {
    /// Network failure or a response body that could not be understood.
    #[error("Network error: {0}")]
    Transport(String),

    /// The server answered with a well-formed body carrying a non-200 code.
    #[error("Request rejected ({code}): {status}")]
    Rejected { code: u16, status: String },

    /// Vote value outside `{0, 1}`.
    #[error("Invalid vote value: {0}")]
    InvalidVote(i64),

    /// Site id that cannot be sent over the wire.
    #[error("Invalid site id: {0:?}")]
    InvalidSiteId(String),

    /// Site was never registered with the board.
    #[error("Unknown site: {0}")]
    UnknownSite(SiteId),

    /// A vote for this site is still waiting on the server.
    #[error("Vote already in flight for site {0}")]
    InFlight(SiteId),

    /// Identity store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network unreachable or malformed response.
    Transport,
    /// Server-side rejection with a reason.
    Rejection,
    /// Caught locally before any request was made.
    Validation,
    /// Local persistence or configuration.
    Storage,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Rejected { .. } => ErrorKind::Rejection,
            Error::InvalidVote(_)
            | Error::InvalidSiteId(_)
            | Error::UnknownSite(_)
            | Error::InFlight(_) => ErrorKind::Validation,
            Error::Storage(_) | Error::Serialization(_) | Error::Io(_) | Error::Config(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Message shown to the user.
    ///
    /// Rejections carry the server's `status` verbatim.
    pub fn notice(&self) -> String {
        match self {
            Error::Rejected { code, status } if status.is_empty() => {
                format!("request failed with code {code}")
            }
            Error::Rejected { status, .. } => status.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
