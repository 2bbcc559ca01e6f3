//! Three-way and recursive merges.
//!
//! # Usage
//!
//! ```ignore
//! use refguard::merge::{MergeCommand, MergeEngine};
//!
//! let result = MergeEngine::default().merge(&MergeCommand {
//!     repository: "/srv/repos/project.git".into(),
//!     author_name: "Jane Doe".into(),
//!     author_mail: "jane@example.com".into(),
//!     message: "Merge branch 'feature'".into(),
//!     ours: "refs/heads/main".into(),
//!     theirs: "refs/heads/feature".into(),
//!     ..MergeCommand::default()
//! })?;
//! ```

mod bases;
mod command;
mod engine;
mod error;

pub use command::MergeCommand;
pub use engine::{MergeEngine, MergeResult};
pub use error::{ConflictingFiles, MergeError};

/// Default number of virtual merge bases built before one base is picked
/// arbitrarily.
///
/// Past the limit a merge that would resolve cleanly may report conflicts.
pub const MERGE_RECURSION_LIMIT: u32 = 20;
