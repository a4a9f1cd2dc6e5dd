//! Search API error types

use thiserror::Error;

/// Search error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SearchError {
    pub kind: SearchErrorKind,
    pub message: String,
    /// HTTP status, when the server answered at all
    pub status: Option<u16>,
}

impl SearchError {
    #[must_use]
    pub fn new(kind: SearchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(SearchErrorKind::Transport, message)
    }

    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(SearchErrorKind::MalformedResponse, message)
    }

    #[must_use]
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(SearchErrorKind::StreamInterrupted, message)
    }
}

/// Error classification
///
/// None of these are retried automatically; retry is always user initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchErrorKind {
    /// Network or HTTP failure during either phase
    Transport,
    /// Payload missing the fields we need (summary, turn id)
    MalformedResponse,
    /// Stream closed or failed before its terminal event
    StreamInterrupted,
}

impl SearchErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::MalformedResponse => "malformed_response",
            Self::StreamInterrupted => "stream_interrupted",
        }
    }
}
