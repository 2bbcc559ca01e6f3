//! The merge engine.
//!
//! Merges are computed entirely in memory: the base tree comes from
//! [`BaseResolver`], `git2` performs the three-way tree merge, and only a
//! clean result is written as a commit. Nothing touches the working tree or
//! the index file of the repository.

use git2::IndexConflict;
use tracing::{debug, info};

use crate::config::{Config, GitConfig};
use crate::merge::bases::BaseResolver;
use crate::merge::command::MergeCommand;
use crate::merge::error::{ConflictingFiles, MergeError};
use crate::merge::MERGE_RECURSION_LIMIT;
use crate::storage::{CommitBuilder, ObjectId, ReferenceName, Repository};
use crate::transaction::Updater;

/// Outcome of a clean merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeResult {
    /// id of the merge commit
    pub commit_id: ObjectId,
}

/// Merges two revisions of a repository into a new commit.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    recursion_limit: u32,
    git: GitConfig,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self {
            recursion_limit: MERGE_RECURSION_LIMIT,
            git: GitConfig::default(),
        }
    }
}

impl MergeEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            recursion_limit: config.merge.recursion_limit,
            git: config.git.clone(),
        }
    }

    /// Set how many virtual merge bases may be built before one is picked.
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn recursion_limit(&self) -> u32 {
        self.recursion_limit
    }

    /// Merge `theirs` into `ours` and write the merge commit.
    ///
    /// No reference is changed. The command is validated before the
    /// repository is opened. A conflict is reported as
    /// [`MergeError::Conflict`] listing every conflicting path.
    pub fn merge(&self, cmd: &MergeCommand) -> Result<MergeResult, MergeError> {
        cmd.validate()?;

        let repo = Repository::open_with_config(&cmd.repository, &self.git).map_err(|_| {
            MergeError::OpenRepository {
                path: cmd.repository.clone(),
            }
        })?;

        let ours = repo.resolve_revision(&cmd.ours)?;
        let theirs = repo.resolve_revision(&cmd.theirs)?;
        debug!(%ours, %theirs, squash = cmd.squash, "merging");

        let commit_id = repo.with_repo(|r| Ok(self.merge_commits(r, cmd, ours, theirs)))??;

        info!(
            repository = %cmd.repository.display(),
            %ours,
            %theirs,
            commit = %commit_id,
            squash = cmd.squash,
            "merge commit created"
        );
        Ok(MergeResult { commit_id })
    }

    /// Merge in `repo`, then move `target` from `ours` to the merge commit.
    ///
    /// The repository of the command is replaced by `repo`, whose transaction
    /// hook votes on the update. The reference update fails if `target` no
    /// longer points at the commit `ours` resolved to.
    pub async fn merge_to_ref(
        &self,
        repo: &Repository,
        mut cmd: MergeCommand,
        target: ReferenceName,
    ) -> Result<MergeResult, MergeError> {
        cmd.repository = repo.path().to_path_buf();
        cmd.validate()?;
        let expected = repo.resolve_revision(&cmd.ours)?;

        let engine = self.clone();
        let result = tokio::task::spawn_blocking(move || engine.merge(&cmd)).await??;

        let mut tx = Updater::new(repo);
        tx.update(target.clone(), Some(expected), result.commit_id);
        let tx = tx.commit().await?;

        info!(tx_id = %tx.id(), reference = %target, commit = %result.commit_id, "merge applied");
        Ok(result)
    }

    fn merge_commits(
        &self,
        repo: &git2::Repository,
        cmd: &MergeCommand,
        ours: ObjectId,
        theirs: ObjectId,
    ) -> Result<ObjectId, MergeError> {
        let base = BaseResolver::new(repo, self.recursion_limit).base_tree(ours.raw(), theirs.raw())?;
        let base_tree = repo.find_tree(base)?;
        let our_tree = repo.find_commit(ours.raw())?.tree()?;
        let their_tree = repo.find_commit(theirs.raw())?.tree()?;

        let mut index = repo.merge_trees(&base_tree, &our_tree, &their_tree, None)?;
        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index.conflicts()? {
                paths.extend(conflict_path(&conflict?));
            }
            return Err(ConflictingFiles::new(paths).into());
        }

        let tree_id = index.write_tree_to(repo)?;
        let mut builder = CommitBuilder::new(repo)
            .tree(tree_id)
            .parent(ours)
            .message(cmd.message.as_str())
            .author(cmd.author())
            .committer(cmd.committer());
        if !cmd.squash {
            builder = builder.parent(theirs);
        }

        Ok(builder.commit()?)
    }
}

fn conflict_path(conflict: &IndexConflict) -> Option<String> {
    [&conflict.our, &conflict.their, &conflict.ancestor]
        .into_iter()
        .flatten()
        .next()
        .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
}
