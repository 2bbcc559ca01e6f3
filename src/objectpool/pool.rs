//! Object pool lifecycle: creation, removal and linking members.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{Config, GitConfig};
use crate::objectpool::error::PoolResult;
use crate::storage::Repository;

/// A bare repository holding objects shared by many forks.
///
/// Members borrow the pool's objects through `objects/info/alternates`, so
/// nothing may ever be pruned from it: every object the pool learns about
/// stays referenced.
#[derive(Debug, Clone)]
pub struct ObjectPool {
    path: PathBuf,
    pub(crate) git: GitConfig,
    pub(crate) stale_lock_grace: Duration,
}

impl ObjectPool {
    pub fn new(path: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            path: path.into(),
            git: config.git.clone(),
            stale_lock_grace: config.pool.stale_lock_grace(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the pool repository has been created.
    pub fn exists(&self) -> bool {
        git2::Repository::open_bare(&self.path).is_ok()
    }

    /// Create the bare pool repository, or open it if it already exists.
    pub fn init(&self) -> PoolResult<Repository> {
        let repo = Repository::init_bare(&self.path, &self.git)?;
        debug!(pool = %self.path.display(), "object pool initialized");
        Ok(repo)
    }

    /// Delete the pool from disk. Removing a missing pool succeeds.
    pub async fn remove(&self) -> PoolResult<()> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                info!(pool = %self.path.display(), "object pool removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Point `member` at the pool's object directory.
    ///
    /// Any previous alternates of the member are replaced.
    pub async fn link(&self, member: &Repository) -> PoolResult<()> {
        let pool = self.init()?;
        let objects = tokio::fs::canonicalize(pool.git_dir().join("objects")).await?;

        let info_dir = member.git_dir().join("objects").join("info");
        tokio::fs::create_dir_all(&info_dir).await?;
        tokio::fs::write(info_dir.join("alternates"), format!("{}\n", objects.display())).await?;

        info!(
            pool = %self.path.display(),
            member = %member.path().display(),
            "repository linked to object pool"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use crate::testutil::{build_commit, setup_repo};

    fn setup() -> (TempDir, ObjectPool) {
        let dir = TempDir::new().unwrap();
        let pool = ObjectPool::new(dir.path().join("pool.git"), &Config::default());
        (dir, pool)
    }

    #[tokio::test]
    async fn test_init_exists_remove() {
        let (_dir, pool) = setup();
        assert!(!pool.exists());

        pool.init().unwrap();
        assert!(pool.exists());
        pool.init().unwrap();

        pool.remove().await.unwrap();
        assert!(!pool.exists());
        pool.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_link_shares_objects() {
        let (_dir, pool) = setup();
        let shared = pool
            .init()
            .unwrap()
            .with_repo(|r| Ok(build_commit(r, &[], &BTreeMap::from([("file", "pooled")]))))
            .unwrap();

        let (member_dir, member) = setup_repo();
        assert!(member.with_repo(|r| Ok(r.find_commit(shared.raw()).is_err())).unwrap());

        pool.link(&member).await.unwrap();

        let alternates = std::fs::read_to_string(member.git_dir().join("objects/info/alternates")).unwrap();
        assert!(alternates.trim_end().ends_with("objects"));

        let reopened = git2::Repository::open(member_dir.path()).unwrap();
        assert!(reopened.find_commit(shared.raw()).is_ok());
    }
}
