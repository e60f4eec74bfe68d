use std::fmt;

use crate::logger::LoggerError;

/// Fixed set of failure categories a [`ClientError`] can carry.
///
/// Callers branch on the kind, never on message text.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// The request was rejected as invalid, or a successful response could
    /// not be decoded into the requested type.
    InvalidRequest,
    /// Authentication failed (HTTP 401).
    Unauthorized,
    /// The requested resource does not exist (HTTP 404).
    NotFound,
    /// The server failed to process the request (HTTP 5xx).
    ServerError,
    /// No response could be obtained from the server.
    ConnectionFailed,
    /// Reserved. Exhausted per-attempt timeouts are `ConnectionFailed` and
    /// caller deadlines are [`Error::DeadlineExceeded`].
    Timeout,
    /// The server understood the request but could not process it (HTTP 422).
    UnprocessableEntity,
    /// The response body was malformed.
    InvalidResponse,
}

impl ErrorKind {
    /// Short human-readable description of the kind.
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "resource not found",
            Self::ServerError => "server error",
            Self::ConnectionFailed => "connection failed",
            Self::Timeout => "request timed out",
            Self::UnprocessableEntity => "unprocessable entity",
            Self::InvalidResponse => "invalid response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ErrorKind {}

/// Maps an HTTP status code onto an error kind.
///
/// Returns `None` for codes outside every rule (1xx, 3xx, 0), which the
/// client reports as [`Error::UnexpectedStatus`].
pub fn kind_for_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 => Some(ErrorKind::Unauthorized),
        404 => Some(ErrorKind::NotFound),
        422 => Some(ErrorKind::UnprocessableEntity),
        400..=499 => Some(ErrorKind::InvalidRequest),
        500..=u16::MAX => Some(ErrorKind::ServerError),
        _ => None,
    }
}

/// A classified failure with optional upstream detail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientError {
    /// Category used for matching.
    pub kind: ErrorKind,
    /// Detail text, usually the server's message or the lower-level error.
    pub message: String,
    /// Provider-specific code or the stringified HTTP status.
    pub code: Option<String>,
}

impl ClientError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Error type returned by [`Client`](crate::Client).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Classified HTTP or transport failure.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Non-success status that maps to no error kind.
    #[error("unexpected status: {reason} ({status})")]
    UnexpectedStatus {
        status: u16,
        reason: String,
        body: String,
    },
    /// The caller's context was cancelled.
    #[error("context canceled")]
    Canceled,
    /// The caller's context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// The request body could not be serialized.
    #[error("failed to marshal request body: {0}")]
    Encode(#[source] serde_json::Error),
    /// Invalid configuration or an unbuildable request.
    #[error("invalid client configuration: {0}")]
    Build(String),
    /// The default logger could not be constructed.
    #[error("failed to create logger: {0}")]
    Logger(#[from] LoggerError),
}

impl Error {
    /// Returns the classified kind, if this error carries one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Client(err) => Some(err.kind),
            _ => None,
        }
    }

    /// Returns `true` when this error carries the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }

    /// Returns `true` when the caller's context ended the request.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }

    /// Returns the classified error, if any.
    pub fn as_client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Client(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{kind_for_status, ClientError, Error, ErrorKind};

    #[test]
    fn status_mapping_follows_first_matching_rule() {
        assert_eq!(kind_for_status(401), Some(ErrorKind::Unauthorized));
        assert_eq!(kind_for_status(404), Some(ErrorKind::NotFound));
        assert_eq!(kind_for_status(422), Some(ErrorKind::UnprocessableEntity));
        assert_eq!(kind_for_status(400), Some(ErrorKind::InvalidRequest));
        assert_eq!(kind_for_status(403), Some(ErrorKind::InvalidRequest));
        assert_eq!(kind_for_status(499), Some(ErrorKind::InvalidRequest));
        assert_eq!(kind_for_status(500), Some(ErrorKind::ServerError));
        assert_eq!(kind_for_status(503), Some(ErrorKind::ServerError));
        assert_eq!(kind_for_status(302), None);
        assert_eq!(kind_for_status(0), None);
    }

    #[test]
    fn display_joins_kind_and_detail() {
        let err = ClientError::new(ErrorKind::NotFound, "user 7 missing");
        assert_eq!(err.to_string(), "resource not found: user 7 missing");

        let bare = ClientError::new(ErrorKind::ServerError, "");
        assert_eq!(bare.to_string(), "server error");
    }

    #[test]
    fn source_exposes_kind() {
        let err = ClientError::new(ErrorKind::Unauthorized, "bad token").with_code("AUTH");
        let source = std::error::Error::source(&err)
            .and_then(|source| source.downcast_ref::<ErrorKind>())
            .copied();
        assert_eq!(source, Some(ErrorKind::Unauthorized));
        assert_eq!(err.code.as_deref(), Some("AUTH"));
    }

    #[test]
    fn wrapped_error_reports_kind() {
        let err = Error::from(ClientError::new(ErrorKind::Timeout, "slow"));
        assert!(err.is(ErrorKind::Timeout));
        assert!(!err.is(ErrorKind::ConnectionFailed));
        assert!(!err.is_cancellation());
        assert_eq!(err.to_string(), "request timed out: slow");

        assert_eq!(Error::Canceled.kind(), None);
        assert!(Error::DeadlineExceeded.is_cancellation());
    }
}
