//! refguard - consistent mutations of Git repositories
//!
//! This crate merges commits, applies reference updates atomically, shares
//! objects between forks through object pools, and removes internal
//! references to history that was rewritten. No operation leaves a
//! repository's references half-updated: every reference change goes
//! through one [`transaction::Updater`] batch.
//!
//! # Example
//!
//! ```no_run
//! use refguard::config::Config;
//! use refguard::merge::{MergeCommand, MergeEngine};
//!
//! let engine = MergeEngine::new(&Config::default());
//! let result = engine
//!     .merge(&MergeCommand {
//!         repository: "./project.git".into(),
//!         author_name: "Jane Doe".into(),
//!         author_mail: "jane@example.com".into(),
//!         message: "Merge branch 'feature'".into(),
//!         ours: "refs/heads/main".into(),
//!         theirs: "refs/heads/feature".into(),
//!         ..MergeCommand::default()
//!     })
//!     .unwrap();
//! println!("merged into {}", result.commit_id);
//! ```

pub mod cleanup;
pub mod config;
pub mod error;
pub mod merge;
pub mod objectpool;
pub mod storage;
pub mod transaction;

#[cfg(test)]
mod testutil;
