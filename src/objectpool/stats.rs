//! Pool size and reference statistics.
//!
//! Purely diagnostic: callers log the numbers and carry on if they cannot be
//! gathered.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::info;
use walkdir::WalkDir;

use crate::objectpool::error::PoolResult;
use crate::objectpool::DANGLING_REF_NAMESPACE;
use crate::storage::{CommandOutput, GitCommand, Repository};

const OBJECT_TYPES: [&str; 4] = ["blob", "commit", "tag", "tree"];

/// Snapshot of a pool's disk usage and reference counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// bytes below `objects/`
    pub objects_size: u64,
    /// bytes below `refs/`
    pub refs_size: u64,
    /// references below `refs/dangling/`, by object type
    pub dangling_refs: BTreeMap<String, u64>,
    /// all other references, by object type
    pub normal_refs: BTreeMap<String, u64>,
}

impl PoolStats {
    pub async fn collect(repo: &Repository) -> PoolResult<Self> {
        let mut stats = PoolStats {
            objects_size: dir_size(&repo.git_dir().join("objects"))?,
            refs_size: dir_size(&repo.git_dir().join("refs"))?,
            ..PoolStats::default()
        };

        let output = repo
            .exec(
                GitCommand::new("for-each-ref")
                    .flag("--format=%(objecttype)%00%(refname)")
                    .arg("refs/"),
            )
            .await?;
        stats.count_refs(&output);

        Ok(stats)
    }

    fn count_refs(&mut self, output: &CommandOutput) {
        for line in output.stdout_lines() {
            let Some((object_type, name)) = line.split_once('\0') else {
                continue;
            };

            let counts = if name.starts_with(DANGLING_REF_NAMESPACE) {
                &mut self.dangling_refs
            } else {
                &mut self.normal_refs
            };
            *counts.entry(object_type.to_string()).or_default() += 1;
        }
    }

    pub fn dangling(&self, object_type: &str) -> u64 {
        self.dangling_refs.get(object_type).copied().unwrap_or(0)
    }

    pub fn normal(&self, object_type: &str) -> u64 {
        self.normal_refs.get(object_type).copied().unwrap_or(0)
    }

    /// Emit the snapshot as one structured event.
    pub fn log(&self, pool: &Path, when: &str) {
        let [blob, commit, tag, tree] = OBJECT_TYPES.map(|t| self.dangling(t));
        let [normal_blob, normal_commit, normal_tag, normal_tree] = OBJECT_TYPES.map(|t| self.normal(t));

        info!(
            pool = %pool.display(),
            when,
            objects_size = self.objects_size,
            refs_size = self.refs_size,
            dangling.blob = blob,
            dangling.commit = commit,
            dangling.tag = tag,
            dangling.tree = tree,
            normal.blob = normal_blob,
            normal.commit = normal_commit,
            normal.tag = normal_tag,
            normal.tree = normal_tree,
            "pool dangling ref stats"
        );
    }
}

/// Total size in bytes of the regular files below `dir`.
pub(crate) fn dir_size(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
