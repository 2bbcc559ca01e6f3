//! Transaction error types.

use thiserror::Error;

use crate::error::{BoxError, ErrorKind};
use crate::storage::StorageError;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur while committing a reference transaction.
///
/// Every variant means the batch was rolled back: no staged reference was
/// changed.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The reference store rejected one of the staged operations.
    #[error("reference update rejected: {stderr}")]
    ReferenceUpdate { stderr: String },

    /// The transaction hook voted against the prepared batch.
    #[error("transaction hook rejected the update: {source}")]
    HookRejected {
        #[source]
        source: BoxError,
    },

    /// `git update-ref` answered something other than the expected status line.
    #[error("unexpected reply from git update-ref: expected {expected:?}, got {got:?}")]
    Protocol { expected: String, got: String },
}

impl TransactionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::Storage(e) => e.kind(),
            TransactionError::ReferenceUpdate { .. } => ErrorKind::ReferenceUpdateFailure,
            TransactionError::HookRejected { .. } => ErrorKind::TransactionHookFailure,
            TransactionError::Protocol { .. } => ErrorKind::SubprocessFailure,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
