//! Object pools shared by repository forks.
//!
//! # Usage
//!
//! ```ignore
//! use refguard::objectpool::ObjectPool;
//!
//! let pool = ObjectPool::new("/srv/pools/project.git", &config);
//! pool.fetch_from_origin(&origin).await?;
//! pool.link(&fork).await?;
//! ```

mod error;
mod fetch;
mod pool;
mod stats;

pub use error::{PoolError, PoolResult};
pub use pool::ObjectPool;
pub use stats::PoolStats;

/// Namespace of the references that keep otherwise unreachable pool objects alive.
pub const DANGLING_REF_NAMESPACE: &str = "refs/dangling/";
