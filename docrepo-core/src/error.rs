//! Error types and result types for repository operations.
//!
//! Every failure surfaced by a repository carries a [`StatusCode`] and an [`ErrorKind`]
//! so callers can assert on which kind of failure occurred instead of matching messages.
//! Use [`RepositoryResult<T>`] as the return type for fallible operations.

use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

/// HTTP-style status code attached to every [`RepositoryError`].
///
/// The values follow the status codes a document database service returns for the
/// same failures, so retry and error-handling code can be written once against either
/// the real service or the in-memory substitute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const PRECONDITION_FAILED: StatusCode = StatusCode(412);
    pub const TOO_MANY_REQUESTS: StatusCode = StatusCode(429);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Returns the numeric value of this status code.
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse classification of a [`RepositoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    PreconditionFailed,
    InvalidOperation,
    Injected,
    Serialization,
}

/// Represents all possible errors returned by a repository.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// An item with the same id already exists in the target collection or partition.
    #[error("Item {id} already exists in {}", describe_scope(.partition))]
    Conflict {
        id: String,
        partition: Option<String>,
    },
    /// The item targeted by a replace or delete does not exist.
    #[error("Item {id} not found in {}", describe_scope(.partition))]
    NotFound {
        id: String,
        partition: Option<String>,
    },
    /// The partition targeted by a replace or delete holds no items.
    #[error("Partition {0} not found")]
    PartitionNotFound(String),
    /// The caller's ETag does not match the stored item's current ETag.
    #[error("Precondition failed for item {id}: expected etag {expected}, current etag {actual}")]
    PreconditionFailed {
        id: String,
        expected: String,
        actual: String,
    },
    /// The repository was used in a way its configuration does not allow, such as
    /// omitting a required partition key or generating an id for a read-only id field.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// An error raised on purpose by a registered fault predicate.
    #[error("Injected failure ({status}): {message}")]
    Injected {
        status: StatusCode,
        message: String,
    },
    /// The continuation token could not be decoded.
    #[error("Invalid continuation token: {0}")]
    InvalidContinuationToken(String),
    /// Serialization error when converting items to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn describe_scope(partition: &Option<String>) -> String {
    match partition {
        Some(key) => format!("partition {key}"),
        None => "collection".to_string(),
    }
}

impl RepositoryError {
    /// Returns the status code a document database service would report for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RepositoryError::Conflict { .. } => StatusCode::CONFLICT,
            RepositoryError::NotFound { .. } | RepositoryError::PartitionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RepositoryError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            RepositoryError::InvalidOperation(_) | RepositoryError::InvalidContinuationToken(_) => {
                StatusCode::BAD_REQUEST
            }
            RepositoryError::Injected { status, .. } => *status,
            RepositoryError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the kind of failure this error represents.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::Conflict { .. } => ErrorKind::Conflict,
            RepositoryError::NotFound { .. } | RepositoryError::PartitionNotFound(_) => {
                ErrorKind::NotFound
            }
            RepositoryError::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            RepositoryError::InvalidOperation(_) | RepositoryError::InvalidContinuationToken(_) => {
                ErrorKind::InvalidOperation
            }
            RepositoryError::Injected { .. } => ErrorKind::Injected,
            RepositoryError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_precondition_failed(&self) -> bool {
        self.kind() == ErrorKind::PreconditionFailed
    }
}

/// A specialized `Result` type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<SerdeJsonError> for RepositoryError {
    fn from(err: SerdeJsonError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let conflict = RepositoryError::Conflict { id: "a".into(), partition: None };
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert!(conflict.is_conflict());

        let missing_partition = RepositoryError::PartitionNotFound("tenant-1".into());
        assert_eq!(missing_partition.status_code().as_u16(), 404);
        assert_eq!(missing_partition.kind(), ErrorKind::NotFound);

        let injected = RepositoryError::Injected {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "slow down".into(),
        };
        assert_eq!(injected.status_code(), StatusCode(429));
        assert_eq!(injected.kind(), ErrorKind::Injected);
    }

    #[test]
    fn messages_name_the_scope() {
        let flat = RepositoryError::NotFound { id: "a".into(), partition: None };
        assert_eq!(flat.to_string(), "Item a not found in collection");

        let scoped = RepositoryError::Conflict { id: "a".into(), partition: Some("p1".into()) };
        assert_eq!(scoped.to_string(), "Item a already exists in partition p1");
    }
}
