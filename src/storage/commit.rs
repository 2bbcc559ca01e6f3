//!  Commit creation and ancestry queries
//!
//! commits produced here use caller-supplied identities and timestamps so the
//! resulting object ids are reproducible: `git2` serializes commit headers in
//! git's canonical order, which is what makes byte-for-byte comparisons work.

use git2::{Oid, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Identity, ObjectId};

/// information about a commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: ObjectId,
    pub tree_id: ObjectId,
    pub parent_ids: Vec<ObjectId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let committer = commit.committer();

        Self {
            id: ObjectId::new(commit.id()),
            tree_id: ObjectId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(ObjectId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            committer_name: committer.name().unwrap_or("").to_string(),
            committer_email: committer.email().unwrap_or("").to_string(),
        }
    }

    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<Oid>,
    parents: Vec<ObjectId>,
    message: String,
    author: Option<Identity>,
    committer: Option<Identity>,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            author: None,
            committer: None,
        }
    }

    /// set the tree for this commit
    pub(crate) fn tree(mut self, tree_id: Oid) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: ObjectId) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn author(mut self, author: Identity) -> Self {
        self.author = Some(author);
        self
    }

    /// set the committer; the author is used when this is never called
    pub fn committer(mut self, committer: Option<Identity>) -> Self {
        self.committer = committer;
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StorageResult<ObjectId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;
        let author = self
            .author
            .ok_or_else(|| StorageError::Internal("commit requires an author".to_string()))?;
        let committer = self.committer.unwrap_or_else(|| author.clone());

        let tree = self.repo.find_tree(tree_id)?;
        let author_sig = author.to_git2_signature()?;
        let committer_sig = committer.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            None,
            &author_sig,
            &committer_sig,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(ObjectId::new(oid))
    }
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: ObjectId) -> StorageResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::RevisionNotFound(id.to_string()))?;

    Ok(CommitInfo::from_git2(&commit))
}

/// find every lowest common ancestor of the given commits
///
/// with more than two inputs, the bases are those of the first commit against
/// a hypothetical merge of all the others. Returns an empty list when the
/// histories are unrelated.
pub(crate) fn find_merge_bases(repo: &Repository, commits: &[Oid]) -> StorageResult<Vec<Oid>> {
    let result = match commits {
        [one, two] => repo.merge_bases(*one, *two),
        _ => repo.merge_bases_many(commits),
    };

    match result {
        Ok(bases) => Ok(bases.iter().copied().collect()),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(Vec::new()),
        Err(e) => Err(StorageError::Git(e)),
    }
}

/// write (or find) the empty tree
pub(crate) fn empty_tree(repo: &Repository) -> StorageResult<Oid> {
    Ok(repo.treebuilder(None)?.write()?)
}
