//! Common error types for registries, the bridge and its connections

use thiserror::Error;

/// Result type for management operations
pub type MgmtResult<T> = Result<T, MgmtError>;

/// Classification of a [`MgmtError`].
///
/// The string form is what travels on the wire as `errorType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ObjectNotFound,
    AttributeNotFound,
    InvalidAttributeValue,
    OperationInvocationFailed,
    UnsupportedOperation,
    TransportFailure,
    InternalInvariantViolation,
    AlreadyExists,
    MalformedName,
    InvalidRequest,
    NotChanged,
    Management,
}

impl ErrorKind {
    /// Wire classification string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ObjectNotFound => "object_not_found",
            ErrorKind::AttributeNotFound => "attribute_not_found",
            ErrorKind::InvalidAttributeValue => "invalid_attribute_value",
            ErrorKind::OperationInvocationFailed => "operation_failed",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::InternalInvariantViolation => "internal_error",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::MalformedName => "malformed_object_name",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotChanged => "not_changed",
            ErrorKind::Management => "management_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by registries, the dispatcher and connections
#[derive(Debug, Error)]
pub enum MgmtError {
    /// No registry holds an object with this name
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// The object exists but has no such (readable/writable) attribute
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    /// Value does not fit the attribute's declared type
    #[error("Invalid attribute value: {0}")]
    InvalidAttributeValue(String),

    /// Target-side failure while executing an operation.
    ///
    /// `error_type` keeps a classification the receiver did not recognise,
    /// so nothing reported by the remote side is dropped.
    #[error("{message}")]
    OperationFailed {
        message: String,
        error_type: Option<String>,
    },

    /// Operation has no counterpart (rejected before any work is done)
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// I/O level failure talking to a remote bridge
    #[error("Transport error: {0}")]
    Transport(String),

    /// Broken invariant (programmer error); never recoverable
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<MgmtError>>,
    },

    /// Registration under a name that is already taken
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    /// Object name could not be parsed or is not valid here
    #[error("Malformed object name: {0}")]
    MalformedName(String),

    /// Request is incomplete or inconsistent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Nothing changed since the requested point in time
    #[error("Not changed")]
    NotChanged,

    /// Generic management failure (e.g. several teardown failures combined)
    #[error("{0}")]
    Management(String),
}

impl MgmtError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MgmtError::ObjectNotFound(_) => ErrorKind::ObjectNotFound,
            MgmtError::AttributeNotFound(_) => ErrorKind::AttributeNotFound,
            MgmtError::InvalidAttributeValue(_) => ErrorKind::InvalidAttributeValue,
            MgmtError::OperationFailed { .. } => ErrorKind::OperationInvocationFailed,
            MgmtError::Unsupported(_) => ErrorKind::UnsupportedOperation,
            MgmtError::Transport(_) => ErrorKind::TransportFailure,
            MgmtError::Internal { .. } => ErrorKind::InternalInvariantViolation,
            MgmtError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            MgmtError::MalformedName(_) => ErrorKind::MalformedName,
            MgmtError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            MgmtError::NotChanged => ErrorKind::NotChanged,
            MgmtError::Management(_) => ErrorKind::Management,
        }
    }

    /// Classification string reported on the wire.
    ///
    /// An operation failure carrying its own classification reports that one.
    pub fn error_type(&self) -> &str {
        match self {
            MgmtError::OperationFailed {
                error_type: Some(t),
                ..
            } => t,
            other => other.kind().as_str(),
        }
    }

    /// Message without the variant prefix added by `Display`
    pub fn message(&self) -> String {
        match self {
            MgmtError::ObjectNotFound(m)
            | MgmtError::AttributeNotFound(m)
            | MgmtError::InvalidAttributeValue(m)
            | MgmtError::Unsupported(m)
            | MgmtError::Transport(m)
            | MgmtError::AlreadyExists(m)
            | MgmtError::MalformedName(m)
            | MgmtError::InvalidRequest(m)
            | MgmtError::Management(m) => m.clone(),
            MgmtError::OperationFailed { message, .. } | MgmtError::Internal { message, .. } => {
                message.clone()
            }
            MgmtError::NotChanged => "Not changed".to_string(),
        }
    }

    /// Status code used in wire responses
    pub fn status_code(&self) -> u16 {
        match self {
            MgmtError::ObjectNotFound(_) => 404,
            MgmtError::AttributeNotFound(_) => 404,
            MgmtError::InvalidAttributeValue(_) => 400,
            MgmtError::OperationFailed { .. } => 500,
            MgmtError::Unsupported(_) => 501,
            MgmtError::Transport(_) => 503,
            MgmtError::Internal { .. } => 500,
            MgmtError::AlreadyExists(_) => 409,
            MgmtError::MalformedName(_) => 400,
            MgmtError::InvalidRequest(_) => 400,
            MgmtError::NotChanged => 304,
            MgmtError::Management(_) => 500,
        }
    }

    /// Operation failure without a foreign classification
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            message: message.into(),
            error_type: None,
        }
    }

    /// Broken invariant without an underlying cause
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Broken invariant caused by `source`
    pub fn internal_with(message: impl Into<String>, source: MgmtError) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Rebuild an error from a kind and message, as read back from the wire
    pub fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::ObjectNotFound => MgmtError::ObjectNotFound(message),
            ErrorKind::AttributeNotFound => MgmtError::AttributeNotFound(message),
            ErrorKind::InvalidAttributeValue => MgmtError::InvalidAttributeValue(message),
            ErrorKind::OperationInvocationFailed => MgmtError::operation_failed(message),
            ErrorKind::UnsupportedOperation => MgmtError::Unsupported(message),
            ErrorKind::TransportFailure => MgmtError::Transport(message),
            ErrorKind::InternalInvariantViolation => MgmtError::internal(message),
            ErrorKind::AlreadyExists => MgmtError::AlreadyExists(message),
            ErrorKind::MalformedName => MgmtError::MalformedName(message),
            ErrorKind::InvalidRequest => MgmtError::InvalidRequest(message),
            ErrorKind::NotChanged => MgmtError::NotChanged,
            ErrorKind::Management => MgmtError::Management(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_classification_is_reported_unchanged() {
        let err = MgmtError::OperationFailed {
            message: "boom".to_string(),
            error_type: Some("vendor.SpecialFailure".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::OperationInvocationFailed);
        assert_eq!(err.error_type(), "vendor.SpecialFailure");
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn kind_round_trips_through_from_kind() {
        let err = MgmtError::from_kind(ErrorKind::AttributeNotFound, "Uptime".to_string());
        assert!(matches!(err, MgmtError::AttributeNotFound(ref m) if m == "Uptime"));
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.error_type(), "attribute_not_found");
    }

    #[test]
    fn internal_keeps_its_source() {
        let err = MgmtError::internal_with(
            "self registration failed",
            MgmtError::MalformedName("bridge:type".to_string()),
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("Malformed object name: bridge:type")
        );
    }
}
