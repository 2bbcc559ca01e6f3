//! Merge error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::storage::StorageError;
use crate::transaction::TransactionError;

/// Paths left with unresolved content conflicts, sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("conflicting files: {}", .paths.join(", "))]
pub struct ConflictingFiles {
    pub paths: Vec<String>,
}

impl ConflictingFiles {
    pub fn new(paths: impl IntoIterator<Item = String>) -> Self {
        let mut paths: Vec<String> = paths.into_iter().collect();
        paths.sort();
        paths.dedup();
        Self { paths }
    }
}

/// Errors that can occur during a merge.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A required command field is empty.
    #[error("invalid parameters: missing {0}")]
    InvalidParameters(&'static str),

    #[error("could not open repository: {}", .path.display())]
    OpenRepository { path: PathBuf },

    /// The merge is not clean. This is an expected outcome.
    #[error(transparent)]
    Conflict(#[from] ConflictingFiles),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error from the underlying Git library.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Moving the target reference failed after the merge commit was written.
    #[error("reference transaction failed: {0}")]
    Transaction(#[from] TransactionError),

    #[error("merge task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            MergeError::OpenRepository { .. } => ErrorKind::RepositoryOpenFailure,
            MergeError::Conflict(_) => ErrorKind::MergeConflict,
            MergeError::Storage(e) => e.kind(),
            MergeError::Transaction(e) => e.kind(),
            MergeError::Git(_) | MergeError::Join(_) => ErrorKind::Internal,
        }
    }

    /// The conflicting paths, when this is a conflict.
    pub fn conflicting_files(&self) -> Option<&[String]> {
        match self {
            MergeError::Conflict(conflict) => Some(&conflict.paths),
            _ => None,
        }
    }
}
