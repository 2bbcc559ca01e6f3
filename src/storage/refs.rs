//!  Reference lookup and listing.
//!
//!  Git is built for name -> object lookups; this module wraps those through
//!  `git2` and parses `for-each-ref` listings for the reverse direction.
//!  Mutations never happen here: they go through
//!  [`Updater`](crate::transaction::Updater) so they stay atomic.

use git2::Repository;

use crate::storage::command::CommandOutput;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{ObjectId, ReferenceName};

/// Reads Git references.
pub struct RefManager;

impl RefManager {
    /// Resolve a revision string (ref, SHA, `HEAD~2`, ...) to a commit ID.
    pub fn resolve_revision(repo: &Repository, revision: &str) -> StorageResult<ObjectId> {
        let object = repo
            .revparse_single(revision)
            .map_err(|_| StorageError::RevisionNotFound(revision.to_string()))?;

        let commit = object
            .peel_to_commit()
            .map_err(|_| StorageError::RevisionNotFound(revision.to_string()))?;

        Ok(ObjectId::new(commit.id()))
    }

    /// Read a reference's target, following symbolic refs.
    pub fn find(repo: &Repository, name: &ReferenceName) -> StorageResult<Option<ObjectId>> {
        let reference = match repo.find_reference(name.as_str()) {
            Ok(reference) => reference,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Git(e)),
        };

        let resolved = reference.resolve()?;
        Ok(resolved.target().map(ObjectId::new))
    }

    /// Parse `%(objectname) %(refname)` lines.
    ///
    /// Any line that does not hold a full object id followed by a reference
    /// name fails the whole listing.
    pub fn parse_listing(
        command: &str,
        output: &CommandOutput,
    ) -> StorageResult<Vec<(ObjectId, ReferenceName)>> {
        output
            .stdout_lines()
            .map(|line| {
                let malformed = || StorageError::MalformedOutput {
                    command: command.to_string(),
                    line: line.clone(),
                };

                let (oid, name) = line.split_once(' ').ok_or_else(malformed)?;
                let oid = ObjectId::from_hex(oid).map_err(|_| malformed())?;
                let name = ReferenceName::new(name).map_err(|_| malformed())?;
                Ok((oid, name))
            })
            .collect()
    }
}
