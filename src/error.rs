//! Error types for the transfer coordinator.

use thiserror::Error;

use crate::item::ErrorKind;

/// Error surfaced by a [`Transport`](crate::transport::Transport)
/// implementation.
///
/// Carries an optional HTTP-equivalent status code and an optional explicit
/// classification; [`TransportError::kind`] resolves the final taxonomy the
/// coordinator acts on.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Status code from the remote, if a response was received at all.
    pub status_code: Option<u16>,
    /// Explicit classification from the transport. Takes precedence over
    /// status-based classification when present.
    pub code: Option<ErrorKind>,
    pub message: String,
}

impl TransportError {
    /// Network-level failure with no response from the remote.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            code: None,
            message: message.into(),
        }
    }

    /// Failure with a response status from the remote.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status),
            code: None,
            message: message.into(),
        }
    }

    /// Locally requested cancellation observed by the transport.
    pub fn canceled() -> Self {
        Self {
            status_code: None,
            code: Some(ErrorKind::Canceled),
            message: "transfer canceled".to_string(),
        }
    }

    /// The remote signaled that the session or signed endpoint expired.
    pub fn expired_session(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            code: Some(ErrorKind::ExpiredSession),
            message: message.into(),
        }
    }

    /// Attach an explicit classification, overriding status-based mapping.
    pub fn with_code(mut self, code: ErrorKind) -> Self {
        self.code = Some(code);
        self
    }

    /// Resolve the error taxonomy kind for this failure.
    ///
    /// An explicit code wins. Otherwise: no status means the bytes never got
    /// a response (`Transport`), 401 means rejected credentials, 403 means an
    /// expired signed endpoint, 5xx means the remote refused the transfer.
    pub fn kind(&self) -> ErrorKind {
        if let Some(code) = self.code {
            return code;
        }
        match self.status_code {
            None => ErrorKind::Transport,
            Some(401) => ErrorKind::Unauthorized,
            Some(403) => ErrorKind::ExpiredSession,
            Some(status) if status >= 500 => ErrorKind::Server,
            Some(_) => ErrorKind::Unknown,
        }
    }
}
