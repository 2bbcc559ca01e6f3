//! Object pool error types.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::storage::StorageError;
use crate::transaction::TransactionError;

/// Result type for object pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// `git fetch` from the origin failed; nothing under the origin
    /// namespace was updated.
    #[error("fetch into object pool: {source}, stderr: {stderr:?}")]
    Fetch {
        #[source]
        source: StorageError,
        stderr: String,
    },

    #[error("repack object pool: {source}, stderr: {stderr:?}")]
    Repack {
        #[source]
        source: StorageError,
        stderr: String,
    },

    /// The batch creating `refs/dangling/*` references was rejected.
    #[error("rescue dangling objects: {0}")]
    Rescue(#[from] TransactionError),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    pub(crate) fn fetch(source: StorageError) -> Self {
        let stderr = source.stderr().unwrap_or_default().to_string();
        PoolError::Fetch { source, stderr }
    }

    pub(crate) fn repack(source: StorageError) -> Self {
        let stderr = source.stderr().unwrap_or_default().to_string();
        PoolError::Repack { source, stderr }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Storage(e) | PoolError::Fetch { source: e, .. } | PoolError::Repack { source: e, .. } => {
                e.kind()
            }
            PoolError::Rescue(e) => e.kind(),
            PoolError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Captured standard error of the failed git command, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            PoolError::Fetch { stderr, .. } | PoolError::Repack { stderr, .. } => Some(stderr),
            PoolError::Storage(e) => e.stderr(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_carries_stderr() {
        let err = PoolError::fetch(StorageError::Command {
            command: "fetch".to_string(),
            code: Some(128),
            stderr: "fatal: '/nope' does not appear to be a git repository".to_string(),
        });

        assert_eq!(err.kind(), ErrorKind::SubprocessFailure);
        assert!(err.stderr().unwrap().contains("does not appear"));
        assert!(err.to_string().starts_with("fetch into object pool"));
    }
}
