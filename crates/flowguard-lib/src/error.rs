//! Errors surfaced by the controller REST client

use thiserror::Error;

/// Failure talking to the network controller
///
/// Every variant is recoverable: callers skip the current tick and retry on
/// the next schedule.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid controller URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("controller request timed out: {0}")]
    Timeout(String),

    #[error("controller unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("controller returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode controller response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ControllerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ControllerError::Timeout(err.to_string())
        } else {
            ControllerError::Transport(err)
        }
    }
}

impl ControllerError {
    /// True when the controller answered but refused the request
    pub fn is_rejection(&self) -> bool {
        matches!(self, ControllerError::Status { .. })
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
