//! Internal reference cleanup after history rewrites.
//!
//! Tools such as `git filter-repo` and BFG write an object map of
//! `<old> <new>` records. Internal references (keep-around, merge request,
//! pipeline refs...) still pointing at a rewritten object would keep the old
//! history alive, so the [`Cleaner`] deletes them in a single transaction.
//!
//! # Usage
//!
//! ```ignore
//! use refguard::cleanup::Cleaner;
//!
//! let cleaner = Cleaner::new(&repo, &config.cleanup.internal_ref_prefixes, None).await?;
//! let summary = cleaner.apply_object_map(tokio::fs::File::open(map).await?).await?;
//! ```

mod cleaner;
mod error;

pub use cleaner::{Cleaner, CleanupSummary, ForEachEntry, ObjectMapEntry, RefLookupTable};
pub use error::{CleanupError, CleanupResult};
