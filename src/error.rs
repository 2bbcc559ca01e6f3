//! Error classification shared by every component.
//!
//! Each module defines its own `thiserror` enum; this module gives callers a
//! single vocabulary to branch on, regardless of which component failed.

use std::fmt;

/// The kind of failure behind any error returned by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required input is missing or malformed (merge arguments, object-map records).
    InvalidParameters,
    /// The target repository does not exist or cannot be read.
    RepositoryOpenFailure,
    /// Content conflicts prevented a merge; the error carries the paths.
    MergeConflict,
    /// A staged reference operation was rejected and the batch rolled back.
    ReferenceUpdateFailure,
    /// The transaction hook rejected a prepared batch.
    TransactionHookFailure,
    /// A git subprocess exited non-zero or produced unparseable output.
    SubprocessFailure,
    /// The call's deadline expired and the in-flight subprocess was killed.
    Cancelled,
    /// Anything else (library errors, I/O).
    Internal,
}

impl ErrorKind {
    /// Errors the caller has to fix before retrying makes any sense.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidParameters | ErrorKind::RepositoryOpenFailure | ErrorKind::MergeConflict
        )
    }

    /// Errors that may succeed when the caller retries the whole operation.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ReferenceUpdateFailure
                | ErrorKind::TransactionHookFailure
                | ErrorKind::SubprocessFailure
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidParameters => "invalid parameters",
            ErrorKind::RepositoryOpenFailure => "repository open failure",
            ErrorKind::MergeConflict => "merge conflict",
            ErrorKind::ReferenceUpdateFailure => "reference update failure",
            ErrorKind::TransactionHookFailure => "transaction hook failure",
            ErrorKind::SubprocessFailure => "subprocess failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boxed error returned by injected callbacks and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(ErrorKind::MergeConflict.is_caller_error());
        assert!(!ErrorKind::MergeConflict.is_retryable());

        assert!(ErrorKind::ReferenceUpdateFailure.is_retryable());
        assert!(!ErrorKind::ReferenceUpdateFailure.is_caller_error());

        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::Cancelled.is_caller_error());
    }
}
