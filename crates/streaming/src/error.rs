use formats::FeatureParseError;
use runtime::Cancelled;
use thiserror::Error;

/// Failure of a single backend request.
///
/// `Cancelled` is not an error from the user's point of view and must never be
/// surfaced; everything else except `NotFound` is transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request cancelled")]
    Cancelled,
    #[error("resource not found")]
    NotFound,
    #[error("HTTP status {status}")]
    Http { status: u16 },
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound)
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Http { .. }
                | FetchError::Timeout
                | FetchError::Transport(_)
                | FetchError::Decode(_)
        )
    }

    /// Status code to show the user, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound => Some(404),
            FetchError::Http { status } => Some(*status),
            _ => None,
        }
    }

    pub fn from_status(status: u16) -> Self {
        if status == 404 {
            FetchError::NotFound
        } else {
            FetchError::Http { status }
        }
    }
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

impl From<FeatureParseError> for FetchError {
    fn from(e: FeatureParseError) -> Self {
        FetchError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::from_status(status.as_u16())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}
