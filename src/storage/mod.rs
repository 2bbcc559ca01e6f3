//! Repository access layer.
//!
//! The other components talk to git only through this module. Reads and
//! object writes go through `git2`; anything git does better itself (ref
//! transactions, fetch, fsck, repack) runs as a `git` subprocess.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Repository                            │
//! │   (git2 handle behind a mutex, subprocess runner, hook)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │   commit    │       │    refs     │       │   command   │
//!  │ (builders)  │       │  (lookups)  │       │ (git argv)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use refguard::storage::{GitCommand, Repository};
//!
//! let repo = Repository::open("/srv/repos/project.git")?;
//! let head = repo.resolve_revision("refs/heads/main")?;
//! let output = repo.exec(GitCommand::new("count-objects").flag("-v")).await?;
//! ```

mod command;
mod commit;
mod error;
mod refs;
mod repository;
mod types;

// Re-export public API
pub use command::{CommandOutput, GitCommand};
pub use commit::{get_commit, CommitBuilder, CommitInfo};
pub use error::{StorageError, StorageResult};
pub use repository::Repository;
pub use types::{Identity, InvalidValueError, ObjectId, ReferenceName};

// Re-export for internal use by other modules
pub(crate) use commit::{empty_tree, find_merge_bases};
