//! Error types for reconciliation.
//!
//! Remote clients report failures through the closed [`RemoteError`]
//! taxonomy. The engine wraps those in [`Error`] with an operation tag and
//! classifies every error into an [`ErrorClass`] so the scheduler knows
//! whether to retry on the next pass, surface the failure, or treat it as a
//! normal control-loop outcome.

use std::fmt;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How the control loop should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A normal negative outcome (absent resource, already archived).
    Expected,
    /// Transient; the next scheduled pass may succeed.
    Recoverable,
    /// Programming or data error; retrying will not help.
    Fatal,
}

impl ErrorClass {
    /// Whether the next pass is worth attempting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    /// Whether the error is a normal outcome rather than a failure.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::Expected)
    }

    /// Get a user-friendly description of this class.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Expected => "Expected condition",
            Self::Recoverable => "Transient failure",
            Self::Fatal => "Permanent failure",
        }
    }

    /// Get actionable advice for this class.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Expected => "No action needed",
            Self::Recoverable => "Will be retried on the next pass",
            Self::Fatal => "Fix the declaration or provider config and re-apply",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Failures reported by a remote resource client.
///
/// The variants the engine branches on (`InvalidId`, `NotFound`,
/// `AlreadyArchived`, `Cancelled`) are distinct sentinels, never strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The identifier is not in the format the remote accepts.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The remote has no such resource.
    #[error("resource not found")]
    NotFound,

    /// The resource was archived before this call.
    #[error("resource already archived")]
    AlreadyArchived,

    /// The cancellation token fired before or during the call.
    #[error("request cancelled")]
    Cancelled,

    /// Connection, TLS, or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote rejected the request.
    #[error("remote returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message from the error body.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Classify this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidId(_) | Self::NotFound | Self::AlreadyArchived => ErrorClass::Expected,
            Self::Cancelled | Self::Transport(_) | Self::Decode(_) => ErrorClass::Recoverable,
            Self::Status { status, .. } => {
                if *status >= 500 || *status == 408 || *status == 429 {
                    ErrorClass::Recoverable
                } else {
                    ErrorClass::Fatal
                }
            }
        }
    }

    /// Whether this error means the resource does not exist remotely.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::InvalidId(_) | Self::NotFound)
    }

    /// Whether a delete that hit this error already reached its end state.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        self.is_absent() || matches!(self, Self::AlreadyArchived)
    }
}

/// Errors surfaced by the connector and reconciler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A remote call failed; `source` keeps the typed sentinel.
    #[error("{context}: {source}")]
    Remote {
        /// Operation tag, e.g. "failed to create product".
        context: String,
        /// Underlying remote failure.
        #[source]
        source: RemoteError,
    },

    /// The declared resource is not the kind this connector handles.
    #[error("resource {found} does not match connector type {expected}")]
    WrongKind {
        /// Kind the connector manages.
        expected: &'static str,
        /// Kind of the declared resource.
        found: String,
    },

    /// The declared resource names no provider config.
    #[error("provider config is not set")]
    ConfigNotSet,

    /// Recording provider config usage failed.
    #[error("cannot track provider config usage: {0}")]
    TrackUsage(String),

    /// The referenced provider config could not be loaded.
    #[error("cannot get provider config {name}: {message}")]
    GetConfig {
        /// Provider config name.
        name: String,
        /// Underlying failure.
        message: String,
    },

    /// Credentials could not be extracted from the provider config.
    #[error("failed to create credentials from provider config: {0}")]
    Credentials(String),

    /// The remote client could not be constructed.
    #[error("error connecting to Metronome: {0}")]
    Connect(String),

    /// A field required by the operation is unset.
    #[error("{field} required for {operation}")]
    MissingField {
        /// Operation that needs the field.
        operation: &'static str,
        /// Parameter name.
        field: &'static str,
    },

    /// A create or update succeeded but the remote returned no identifier.
    #[error("{kind} ID is missing")]
    MissingId {
        /// Resource kind.
        kind: &'static str,
    },

    /// The kind has no update endpoint.
    #[error("updating a {kind} is not supported")]
    UpdateUnsupported {
        /// Resource kind.
        kind: &'static str,
    },

    /// A cross-resource reference has not been resolved yet.
    #[error("{field} not yet resolvable")]
    Unresolvable {
        /// Parameter the reference fills in.
        field: String,
    },

    /// The pass was cancelled before the operation started.
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap a remote error with an operation tag.
    pub fn remote(context: impl Into<String>, source: RemoteError) -> Self {
        Self::Remote {
            context: context.into(),
            source,
        }
    }

    /// Classify this error for the control loop.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Remote { source, .. } => source.class(),
            Error::TrackUsage(_)
            | Error::GetConfig { .. }
            | Error::Credentials(_)
            | Error::Connect(_)
            | Error::Unresolvable { .. }
            | Error::Cancelled => ErrorClass::Recoverable,
            Error::WrongKind { .. }
            | Error::ConfigNotSet
            | Error::MissingField { .. }
            | Error::MissingId { .. }
            | Error::UpdateUnsupported { .. } => ErrorClass::Fatal,
        }
    }

    /// The typed remote failure behind this error, if any.
    #[must_use]
    pub fn remote_source(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_class_retryable() {
        assert!(ErrorClass::Recoverable.is_retryable());
        assert!(!ErrorClass::Expected.is_retryable());
        assert!(!ErrorClass::Fatal.is_retryable());
    }

    #[test]
    fn test_error_class_ignorable() {
        assert!(ErrorClass::Expected.is_ignorable());
        assert!(!ErrorClass::Recoverable.is_ignorable());
        assert!(!ErrorClass::Fatal.is_ignorable());
    }

    #[test]
    fn test_error_class_display() {
        assert_eq!(format!("{}", ErrorClass::Recoverable), "Transient failure");
        assert!(!ErrorClass::Fatal.advice().is_empty());
    }

    #[test]
    fn test_remote_sentinels_are_expected() {
        assert_eq!(
            RemoteError::InvalidId("x".into()).class(),
            ErrorClass::Expected
        );
        assert_eq!(RemoteError::NotFound.class(), ErrorClass::Expected);
        assert_eq!(RemoteError::AlreadyArchived.class(), ErrorClass::Expected);
    }

    #[test]
    fn test_remote_status_classification() {
        let server = RemoteError::Status {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(server.class(), ErrorClass::Recoverable);

        let throttled = RemoteError::Status {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(throttled.class(), ErrorClass::Recoverable);

        let rejected = RemoteError::Status {
            status: 400,
            message: "bad aggregation_type".into(),
        };
        assert_eq!(rejected.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_remote_transport_and_decode_recoverable() {
        assert!(RemoteError::Transport("reset".into()).class().is_retryable());
        assert!(RemoteError::Decode("eof".into()).class().is_retryable());
        assert!(RemoteError::Cancelled.class().is_retryable());
    }

    #[test]
    fn test_remote_is_gone() {
        assert!(RemoteError::AlreadyArchived.is_gone());
        assert!(RemoteError::NotFound.is_gone());
        assert!(RemoteError::InvalidId("abc".into()).is_gone());
        assert!(!RemoteError::AlreadyArchived.is_absent());
        assert!(!RemoteError::Transport("x".into()).is_gone());
    }

    #[test]
    fn test_remote_context_keeps_source() {
        let err = Error::remote("failed to create product", RemoteError::AlreadyArchived);
        assert_eq!(
            err.to_string(),
            "failed to create product: resource already archived"
        );
        assert_eq!(err.remote_source(), Some(&RemoteError::AlreadyArchived));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_fatal_errors() {
        assert_eq!(
            Error::MissingId {
                kind: "billable metric"
            }
            .class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            Error::UpdateUnsupported { kind: "rate" }.class(),
            ErrorClass::Fatal
        );
        assert_eq!(Error::ConfigNotSet.class(), ErrorClass::Fatal);
        assert_eq!(
            Error::WrongKind {
                expected: "product",
                found: "rate".into()
            }
            .class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_missing_field_message() {
        let err = Error::MissingField {
            operation: "update",
            field: "starting_at",
        };
        assert!(err.to_string().contains("starting_at required"));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_connect_time_errors_recoverable() {
        assert!(Error::Credentials("no token".into()).is_retryable());
        assert!(
            Error::GetConfig {
                name: "default".into(),
                message: "missing".into()
            }
            .is_retryable()
        );
        assert!(Error::Cancelled.is_retryable());
        assert!(
            Error::Unresolvable {
                field: "product_id".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_update_unsupported_message() {
        let err = Error::UpdateUnsupported {
            kind: "billable metric",
        };
        assert_eq!(err.to_string(), "updating a billable metric is not supported");
    }
}
