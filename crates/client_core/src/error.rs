use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    Session,
    History,
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::History => f.write_str("message history"),
        }
    }
}

/// Failures surfaced to the presentation layer. None of them stop the view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("failed to fetch {target}: {message}")]
    FetchFailure {
        target: FetchTarget,
        message: String,
    },
    #[error("live channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("message text must not be blank")]
    BlankMessage,
    #[error("session view is no longer running")]
    ViewClosed,
}
