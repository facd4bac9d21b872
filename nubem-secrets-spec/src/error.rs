use std::fmt;

use thiserror::Error;

/// Result alias for tenant-scoped secret operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Result alias for raw storage calls.
pub type StoreResult<T> = core::result::Result<T, StoreError>;

/// Operations exposed to the transport layer, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    ListVersions,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::ListVersions => "list_versions",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable error vocabulary handed to callers.
///
/// Transports map each kind to a fixed response shape and never need to
/// inspect error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidName,
    InvalidLabel,
    NotFound,
    AlreadyExists,
    BackendUnavailable,
    DirectoryEnrichmentFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::InvalidLabel => "invalid_label",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::DirectoryEnrichmentFailure => "directory_enrichment_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by the tenancy layer.
///
/// A secret that exists but belongs to another identity is reported as
/// [`Error::NotFound`], exactly like a missing one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("secret name `{name}` is invalid: names must match [a-zA-Z0-9_-]+")]
    InvalidName { name: String },
    #[error("label `{key}` is invalid: {reason}")]
    InvalidLabel { key: String, reason: String },
    #[error("secret `{name}` not found")]
    NotFound { name: String },
    #[error("secret `{name}` already exists")]
    AlreadyExists { name: String },
    #[error("backend unavailable during {operation}: {message}")]
    BackendUnavailable {
        operation: Operation,
        name: Option<String>,
        message: String,
    },
    #[error("failed to load version details for secret `{name}`: {message}")]
    DirectoryEnrichment { name: String, message: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidName { .. } => ErrorKind::InvalidName,
            Error::InvalidLabel { .. } => ErrorKind::InvalidLabel,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Error::DirectoryEnrichment { .. } => ErrorKind::DirectoryEnrichmentFailure,
        }
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Error::InvalidName { name: name.into() }
    }

    pub fn invalid_label(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidLabel {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }
}

/// Raw failures reported by a [`crate::SecretStore`] implementation.
///
/// These never cross the tenancy layer; they are translated into [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("{resource} already exists")]
    AlreadyExists { resource: String },
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let err = Error::BackendUnavailable {
            operation: Operation::Create,
            name: Some("db-pass".into()),
            message: "connection reset".into(),
        };
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(err.kind().as_str(), "backend_unavailable");
        assert_eq!(
            err.to_string(),
            "backend unavailable during create: connection reset"
        );

        let err = Error::DirectoryEnrichment {
            name: "api-key".into(),
            message: "timeout".into(),
        };
        assert_eq!(err.kind(), ErrorKind::DirectoryEnrichmentFailure);
    }

    #[test]
    fn not_found_message_does_not_mention_owner() {
        let err = Error::not_found("db-pass");
        assert_eq!(err.to_string(), "secret `db-pass` not found");
    }
}
