//! Error types for Metronome API calls.
//!
//! Errors are categorized so callers can tell transient failures from
//! rejected requests, and so the sentinels the reconciler branches on
//! (`NotFound`, `AlreadyArchived`, `InvalidId`, `Cancelled`) stay typed.

use reconcile::RemoteError;
use std::fmt;

/// Result type alias for Metronome API calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of API errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, TLS, timeout, or server-side failure (retryable).
    Network,
    /// The resource does not exist.
    NotFound,
    /// The resource was already archived (ignorable on delete).
    AlreadyArchived,
    /// The request was rejected before or by the API.
    InvalidInput,
    /// The response body could not be decoded.
    Format,
    /// The caller cancelled the request.
    Cancelled,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Cancelled)
    }

    /// Whether this error can be safely ignored when archiving.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::NotFound | Self::AlreadyArchived)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Resource not found",
            Self::AlreadyArchived => "Already archived",
            Self::InvalidInput => "Request rejected",
            Self::Format => "Invalid response format",
            Self::Cancelled => "Request cancelled",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check connectivity to the Metronome API and try again",
            Self::NotFound => "The resource may have been removed outside this tool",
            Self::AlreadyArchived => "No action needed",
            Self::InvalidInput => "Check the declared parameters against the Metronome API",
            Self::Format => "The API may have changed; try again or report the response",
            Self::Cancelled => "Increase the timeout or try again",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the Metronome API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The identifier is not a UUID; no request was sent.
    #[error("invalid ID {0:?}: not a UUID")]
    InvalidId(String),

    /// The API returned 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API reported the resource as already archived.
    #[error("already archived: {0}")]
    AlreadyArchived(String),

    /// The cancellation token fired before or during the request.
    #[error("request cancelled")]
    Cancelled,

    /// The request did not complete.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The API answered with a non-2xx status.
    #[error("Metronome API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the error body.
        message: String,
    },

    /// Invalid response from the API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// The configured base URL is not an http(s) URL.
    #[error("invalid base URL {0:?}")]
    InvalidBaseUrl(String),
}

impl Error {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Build an error from a non-2xx response.
    ///
    /// The body is expected to be `{"message": "..."}`; anything else is
    /// used verbatim.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<crate::types::ApiMessage>(body)
            .map(|m| m.message)
            .unwrap_or_else(|_| body.trim().to_string());

        if status == 404 {
            Self::NotFound(message)
        } else if message.to_lowercase().contains("already archived") {
            Self::AlreadyArchived(message)
        } else {
            Self::Api { status, message }
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidId(_) | Error::InvalidBaseUrl(_) => ErrorCategory::InvalidInput,
            Error::NotFound(_) => ErrorCategory::NotFound,
            Error::AlreadyArchived(_) => ErrorCategory::AlreadyArchived,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Http { .. } => ErrorCategory::Network,
            Error::Api { status, .. } => {
                if *status >= 500 || *status == 408 || *status == 429 {
                    ErrorCategory::Network
                } else {
                    ErrorCategory::InvalidInput
                }
            }
            Error::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error can be safely ignored when archiving.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::http(format!("HTTP {code}"), Some(code)),
            other => Self::http(other.to_string(), None),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<Error> for RemoteError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidId(id) => RemoteError::InvalidId(id),
            Error::NotFound(_) => RemoteError::NotFound,
            Error::AlreadyArchived(_) => RemoteError::AlreadyArchived,
            Error::Cancelled => RemoteError::Cancelled,
            Error::Http {
                message,
                status: Some(status),
            } => RemoteError::Status { status, message },
            Error::Http {
                message,
                status: None,
            } => RemoteError::Transport(message),
            Error::Api { status, message } => RemoteError::Status { status, message },
            Error::InvalidResponse(message) => RemoteError::Decode(message),
            e @ Error::InvalidBaseUrl(_) => RemoteError::Transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Cancelled.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::AlreadyArchived.is_retryable());
        assert!(!ErrorCategory::InvalidInput.is_retryable());
        assert!(!ErrorCategory::Format.is_retryable());
    }

    #[test]
    fn test_error_category_ignorable() {
        assert!(ErrorCategory::NotFound.is_ignorable());
        assert!(ErrorCategory::AlreadyArchived.is_ignorable());
        assert!(!ErrorCategory::Network.is_ignorable());
        assert!(!ErrorCategory::InvalidInput.is_ignorable());
    }

    #[test]
    fn test_error_category_display() {
        let display = format!("{}", ErrorCategory::Network);
        assert!(display.contains("Network"));
        assert!(!ErrorCategory::Format.advice().is_empty());
    }

    #[test]
    fn test_from_response_not_found() {
        let err = Error::from_response(404, r#"{"message": "billable metric not found"}"#);
        assert!(matches!(err, Error::NotFound(ref m) if m == "billable metric not found"));
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_response_already_archived() {
        let err = Error::from_response(400, r#"{"message": "Product is already archived"}"#);
        assert!(matches!(err, Error::AlreadyArchived(_)));
        assert!(err.is_ignorable());
    }

    #[test]
    fn test_from_response_plain_body() {
        let err = Error::from_response(502, "Bad Gateway\n");
        match err {
            Error::Api { status, ref message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            _ => panic!("Expected Error::Api"),
        }
        assert!(err.is_retryable());
    }

    #[test]
    fn test_api_client_error_not_retryable() {
        let err = Error::from_response(400, r#"{"message": "name is required"}"#);
        assert_eq!(err.category(), ErrorCategory::InvalidInput);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_http_constructor() {
        let err = Error::http("connection reset", None);
        match err {
            Error::Http { message, status } => {
                assert_eq!(message, "connection reset");
                assert_eq!(status, None);
            }
            _ => panic!("Expected Error::Http"),
        }
    }

    #[test]
    fn test_into_remote_error_sentinels() {
        assert_eq!(
            RemoteError::from(Error::InvalidId("x".to_string())),
            RemoteError::InvalidId("x".to_string())
        );
        assert_eq!(
            RemoteError::from(Error::NotFound("gone".to_string())),
            RemoteError::NotFound
        );
        assert_eq!(
            RemoteError::from(Error::AlreadyArchived("done".to_string())),
            RemoteError::AlreadyArchived
        );
        assert_eq!(RemoteError::from(Error::Cancelled), RemoteError::Cancelled);
    }

    #[test]
    fn test_into_remote_error_status() {
        let remote: RemoteError = Error::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
        .into();
        assert_eq!(
            remote,
            RemoteError::Status {
                status: 503,
                message: "unavailable".to_string()
            }
        );
        assert!(remote.class().is_retryable());

        let remote: RemoteError = Error::http("dns failure", None).into();
        assert!(matches!(remote, RemoteError::Transport(_)));
    }

    #[test]
    fn test_serde_error_is_invalid_response() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.category(), ErrorCategory::Format);
        assert!(matches!(
            RemoteError::from(err),
            RemoteError::Decode(_)
        ));
    }
}
