//! Cleaner error types.

use thiserror::Error;

use crate::error::{BoxError, ErrorKind};
use crate::storage::StorageError;
use crate::transaction::TransactionError;

pub type CleanupResult<T> = Result<T, CleanupError>;

/// Errors returned while applying an object map.
///
/// None of them leave deletions behind: staged deletions are only committed
/// once the whole map has been read.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// A record is not two full object ids separated by one space.
    #[error("object map invalid at line {line}")]
    InvalidObjectMap { line: u64 },

    /// The per-entry callback stopped the run.
    #[error("object map callback failed: {0}")]
    Callback(#[source] BoxError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("could not read object map: {0}")]
    Io(#[from] std::io::Error),
}

impl CleanupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CleanupError::InvalidObjectMap { .. } => ErrorKind::InvalidParameters,
            CleanupError::Storage(e) => e.kind(),
            CleanupError::Transaction(e) => e.kind(),
            CleanupError::Callback(_) | CleanupError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
