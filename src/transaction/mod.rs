//! Atomic reference transactions.
//!
//! Every reference mutation in this crate goes through an [`Updater`]: the
//! merge engine moving a branch, the object pool rescuing dangling objects and
//! the cleaner deleting internal references. A batch either applies in full
//! or leaves every reference untouched.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Updater<TxOpen>                          │
//! │     (stages create / update / delete, last write wins)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ commit()
//!                              ▼
//!  ┌──────────────────┐   prepare: ok   ┌──────────────────┐
//!  │ git update-ref   │ ──────────────▶ │ TransactionHook  │
//!  │  -z --stdin      │ ◀────────────── │     vote()       │
//!  └──────────────────┘  commit/abort   └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use refguard::transaction::Updater;
//!
//! let mut tx = Updater::new(&repo);
//! tx.update(branch, Some(old), new);
//! tx.delete(stale);
//! tx.commit().await?;  // or tx.rollback();
//! ```

mod error;
mod hook;
mod updater;

pub use error::{TransactionError, TransactionResult};
pub use hook::{NoopHook, RefOperation, RefUpdate, TransactionHook};
pub use updater::{TxAborted, TxCommitted, TxOpen, Updater};
