//! Error types for the conversational engine.

use beacon_location::LocationError;

/// Failures of a single dialogue backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend misconfigured: {0}")]
    Config(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend response malformed: {0}")]
    InvalidResponse(String),
    #[error("backend returned an empty reply")]
    EmptyReply,
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::InvalidResponse(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Errors from session engine operations.
///
/// Every variant has already been turned into a notification (where the
/// user needs one) by the time it is returned.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session is no longer active")]
    Inactive,
    #[error("reply arrived after the session was closed")]
    Discarded,
    #[error("locale not supported: {0}")]
    UnsupportedLocale(String),
    #[error("dialogue error: {0}")]
    Backend(#[from] BackendError),
    #[error("location error: {0}")]
    Location(#[from] LocationError),
}
