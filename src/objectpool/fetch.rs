//! Fetching into an object pool.
//!
//! The steps are strictly sequential, each one working on the objects the
//! previous one brought in:
//!
//! 1. remove maintenance state left behind by crashed git processes
//! 2. fetch every origin reference into `refs/remotes/origin/`
//! 3. give every dangling object a reference below `refs/dangling/`
//! 4. pack references and repack objects with delta islands

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::objectpool::error::{PoolError, PoolResult};
use crate::objectpool::pool::ObjectPool;
use crate::objectpool::stats::PoolStats;
use crate::objectpool::DANGLING_REF_NAMESPACE;
use crate::storage::{GitCommand, ObjectId, ReferenceName, Repository, StorageError};
use crate::transaction::Updater;

const ORIGIN_REF_NAMESPACE: &str = "refs/remotes/origin";

impl ObjectPool {
    /// Initialize the pool if needed and fetch all objects of `origin`.
    ///
    /// Fetch and repack failures carry git's standard error. Nothing is
    /// retried.
    pub async fn fetch_from_origin(&self, origin: &Repository) -> PoolResult<()> {
        let pool = self.init()?;

        let removed = clean_stale_data(pool.git_dir(), self.stale_lock_grace)?;
        if removed > 0 {
            info!(pool = %self.path().display(), removed, "removed stale lock files");
        }

        self.log_stats(&pool, "before fetch").await;

        let fetch = GitCommand::new("fetch")
            .flags(["--quiet", "--atomic", "--no-tags", "--no-write-fetch-head"])
            .arg(origin.path())
            .arg(format!("+refs/*:{}/*", ORIGIN_REF_NAMESPACE));
        pool.exec(fetch).await.map_err(PoolError::fetch)?;

        let rescued = self.rescue_dangling_objects(&pool).await?;

        self.log_stats(&pool, "after fetch").await;

        pool.exec(GitCommand::new("pack-refs").flag("--all")).await?;
        self.repack(&pool).await?;

        info!(
            pool = %self.path().display(),
            origin = %origin.path().display(),
            rescued,
            "fetched into object pool"
        );
        Ok(())
    }

    /// Create `refs/dangling/<oid>` for every object no reference reaches.
    ///
    /// There is no reliable way to tell whether some member still needs an
    /// object, so every object is kept alive.
    async fn rescue_dangling_objects(&self, pool: &Repository) -> PoolResult<usize> {
        let output = pool
            .exec(GitCommand::new("fsck").flag("--connectivity-only").flag("--dangling"))
            .await?;

        let mut tx = Updater::new(pool).without_transactions();
        for line in output.stdout_lines() {
            let mut fields = line.splitn(3, ' ');
            let (Some("dangling"), Some(_), Some(oid)) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };

            let oid = ObjectId::from_hex(oid).map_err(StorageError::from)?;
            let name = ReferenceName::in_namespace(DANGLING_REF_NAMESPACE, &oid.to_string())
                .map_err(StorageError::from)?;
            tx.create(name, oid);
        }

        let rescued = tx.updates().len();
        tx.commit().await?;
        Ok(rescued)
    }

    async fn repack(&self, pool: &Repository) -> PoolResult<()> {
        let repack = GitCommand::new("repack")
            .config("pack.island", format!("{}/he(a)ds", ORIGIN_REF_NAMESPACE))
            .config("pack.island", format!("{}/t(a)gs", ORIGIN_REF_NAMESPACE))
            .config("pack.islandCore", "a")
            .config("pack.writeBitmapHashCache", "true")
            .flag("-aidb")
            .flag("-n");

        pool.exec(repack).await.map_err(PoolError::repack)?;
        Ok(())
    }

    async fn log_stats(&self, pool: &Repository, when: &str) {
        match PoolStats::collect(pool).await {
            Ok(stats) => stats.log(self.path(), when),
            Err(e) => warn!(pool = %self.path().display(), when, error = %e, "could not gather pool stats"),
        }
    }
}

/// Remove reference lock files older than `grace`.
///
/// A crashed git process leaves its locks behind, which would make every
/// later reference update in the pool fail.
pub(crate) fn clean_stale_data(git_dir: &Path, grace: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut candidates = vec![git_dir.join("packed-refs.lock")];
    candidates.extend(
        WalkDir::new(git_dir.join("refs"))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".lock"))
            .map(|entry| entry.into_path()),
    );

    let mut removed = 0;
    for path in candidates {
        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let stale = now.duration_since(modified).is_ok_and(|age| age >= grace);
        if !stale {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}
