//! Storage layer error types
//!
//! All errors that can occur while talking to a repository, either through
//! `git2` or through a `git` subprocess, are defined here.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::storage::types::InvalidValueError;

/// the main error type for repository access
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// the path does not hold a readable repository
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// a revision could not be resolved to a commit
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// an object id or reference name failed validation
    #[error("invalid value: {0}")]
    InvalidValue(#[from] InvalidValueError),

    /// a git subprocess exited unsuccessfully
    #[error("git {command} failed with {}: {stderr}", exit_display(.code))]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// a git subprocess could not be started
    #[error("could not spawn git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// the call's deadline expired; the subprocess was killed
    #[error("git {command} cancelled after {}ms", .timeout.as_millis())]
    Cancelled { command: String, timeout: Duration },

    /// a subprocess produced output we could not parse
    #[error("malformed output from git {command}: {line:?}")]
    MalformedOutput { command: String, line: String },

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

fn exit_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "signal".to_string(),
    }
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotARepository(_) => ErrorKind::RepositoryOpenFailure,
            StorageError::RevisionNotFound(_) | StorageError::InvalidValue(_) => {
                ErrorKind::InvalidParameters
            }
            StorageError::Command { .. }
            | StorageError::Spawn { .. }
            | StorageError::MalformedOutput { .. } => ErrorKind::SubprocessFailure,
            StorageError::Cancelled { .. } => ErrorKind::Cancelled,
            StorageError::Git(_) | StorageError::Io(_) | StorageError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// captured standard error of a failed subprocess, if any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            StorageError::Command { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotARepository(_) | StorageError::RevisionNotFound(_)
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
