//! Service layer error types
//!
//! Every failure a caller can see is either a domain rule violation or a
//! rejected request. [`ErrorKind`] folds both into the engine's taxonomy.

use std::fmt;

use circle_core::DomainError;
use validator::ValidationErrors;

/// Service layer error type
#[derive(Debug)]
pub enum ServiceError {
    /// Domain rule violation or store failure
    Domain(DomainError),

    /// Request failed validation
    Validation(String),
}

/// Caller-facing classification of a [`ServiceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NotAuthorized,
    InvalidState,
    InvalidInviteCode,
    InviteExpired,
    InviteUsageExceeded,
    AlreadyExists,
    StoreFailure,
    Validation,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(e) => write!(f, "{e}"),
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Domain(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

impl ServiceError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store_failure(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::StoreFailure(msg.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        let Self::Domain(e) = self else {
            return ErrorKind::Validation;
        };
        match e {
            DomainError::InvalidInviteCode => ErrorKind::InvalidInviteCode,
            DomainError::InviteExpired => ErrorKind::InviteExpired,
            DomainError::InviteUsageExceeded => ErrorKind::InviteUsageExceeded,
            e if e.is_not_found() => ErrorKind::NotFound,
            e if e.is_authorization() => ErrorKind::NotAuthorized,
            e if e.is_conflict() => ErrorKind::AlreadyExists,
            e if e.is_validation() => ErrorKind::Validation,
            e if e.is_store_failure() => ErrorKind::StoreFailure,
            _ => ErrorKind::InvalidState,
        }
    }

    /// Only store failures are worth retrying; every other error repeats
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StoreFailure
    }

    /// The wrapped domain error, if any
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(e) => Some(e),
            Self::Validation(_) => None,
        }
    }

    /// Stable error code for callers
    pub fn error_code(&self) -> &str {
        match self {
            Self::Domain(e) => e.code(),
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{field}: {message}"),
                    None => format!("{field}: {}", e.code),
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages.join("; "))
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
