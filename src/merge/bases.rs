//! Merge-base resolution for criss-cross histories.
//!
//! When two commits have several lowest common ancestors, the candidates are
//! folded pairwise into virtual bases: each fold merges the running base with
//! the next candidate, against the merge base of those two. That inner merge
//! may itself need a virtual base, so the fold nests.
//!
//! The nesting is driven by an explicit stack of [`Frame`]s instead of call
//! recursion. Every fold bumps a level counter which is inherited (plus one)
//! by the nested frame. Once a frame's level exceeds the limit it stops
//! folding and keeps whatever base it has accumulated so far.

use std::path::Path;

use git2::{Index, IndexEntry, Oid, Repository};
use tracing::debug;

use crate::storage::{empty_tree, find_merge_bases, StorageResult};

const STAGE_MASK: u16 = 0x3000;

/// A merge base: a real commit or a tree synthesized from several of them.
#[derive(Debug, Clone)]
enum Node {
    Real(Oid),
    Virtual { tree: Oid, heads: Vec<Oid> },
}

impl Node {
    fn tree(&self, repo: &Repository) -> StorageResult<Oid> {
        match self {
            Node::Real(commit) => Ok(repo.find_commit(*commit)?.tree_id()),
            Node::Virtual { tree, .. } => Ok(*tree),
        }
    }

    /// commits this base stands for, used to look up the next merge base
    fn heads(&self) -> Vec<Oid> {
        match self {
            Node::Real(commit) => vec![*commit],
            Node::Virtual { heads, .. } => heads.clone(),
        }
    }
}

/// Folding state for one set of candidate bases.
struct Frame {
    bases: Vec<Oid>,
    next: usize,
    acc: Node,
    level: u32,
}

impl Frame {
    /// `None` when there is nothing to fold: the histories are unrelated.
    fn new(bases: Vec<Oid>, level: u32) -> Option<Self> {
        let first = *bases.first()?;
        Some(Self {
            bases,
            next: 1,
            acc: Node::Real(first),
            level,
        })
    }
}

/// Computes the tree that serves as the ancestor of a three-way merge.
pub(crate) struct BaseResolver<'r> {
    repo: &'r Repository,
    limit: u32,
}

impl<'r> BaseResolver<'r> {
    pub(crate) fn new(repo: &'r Repository, limit: u32) -> Self {
        Self { repo, limit }
    }

    /// Ancestor tree for merging `ours` and `theirs`.
    ///
    /// Unrelated histories merge against the empty tree.
    pub(crate) fn base_tree(&self, ours: Oid, theirs: Oid) -> StorageResult<Oid> {
        let bases = find_merge_bases(self.repo, &[ours, theirs])?;
        debug!(candidates = bases.len(), "merge bases found");

        let Some(root) = Frame::new(bases, 0) else {
            return empty_tree(self.repo);
        };

        let mut stack = vec![root];
        // base produced by the frame that was just popped; `Some(None)` when
        // the nested histories were unrelated
        let mut finished: Option<Option<Node>> = None;

        loop {
            let Some(frame) = stack.last_mut() else {
                return empty_tree(self.repo);
            };

            if let Some(inner) = finished.take() {
                let other = Node::Real(frame.bases[frame.next]);
                let base_tree = match &inner {
                    Some(node) => node.tree(self.repo)?,
                    None => empty_tree(self.repo)?,
                };
                let acc_tree = frame.acc.tree(self.repo)?;
                let other_tree = other.tree(self.repo)?;

                let tree = self.merge_virtual(base_tree, acc_tree, other_tree)?;
                let mut heads = frame.acc.heads();
                heads.extend(other.heads());
                frame.acc = Node::Virtual { tree, heads };
                frame.next += 1;
            }

            if frame.next < frame.bases.len() {
                frame.level += 1;
                if frame.level <= self.limit {
                    let mut heads = frame.acc.heads();
                    heads.push(frame.bases[frame.next]);
                    let nested = find_merge_bases(self.repo, &heads)?;

                    match Frame::new(nested, frame.level + 1) {
                        Some(child) => stack.push(child),
                        None => finished = Some(None),
                    }
                    continue;
                }

                debug!(level = frame.level, limit = self.limit, "merge recursion limit reached");
                frame.next = frame.bases.len();
            }

            let done = stack.pop().map(|frame| frame.acc);
            if stack.is_empty() {
                return match done {
                    Some(node) => node.tree(self.repo),
                    None => empty_tree(self.repo),
                };
            }
            finished = Some(done);
        }
    }

    /// Three-way merge of trees that never fails on conflicts.
    ///
    /// Conflicting paths get both sides written between conflict markers, so
    /// the resulting base differs from either side and the conflict
    /// resurfaces in any merge that uses it.
    fn merge_virtual(&self, base: Oid, ours: Oid, theirs: Oid) -> StorageResult<Oid> {
        let base = self.repo.find_tree(base)?;
        let ours = self.repo.find_tree(ours)?;
        let theirs = self.repo.find_tree(theirs)?;

        let mut index = self.repo.merge_trees(&base, &ours, &theirs, None)?;
        if index.has_conflicts() {
            self.write_conflict_markers(&mut index)?;
        }
        Ok(index.write_tree_to(self.repo)?)
    }

    fn write_conflict_markers(&self, index: &mut Index) -> StorageResult<()> {
        let conflicts = index.conflicts()?.collect::<Result<Vec<_>, _>>()?;

        for conflict in conflicts {
            let Some(template) = conflict.our.as_ref().or(conflict.their.as_ref()) else {
                continue;
            };

            let mut content = b"<<<<<<< ours\n".to_vec();
            content.extend(self.side_content(conflict.our.as_ref())?);
            content.extend_from_slice(b"=======\n");
            content.extend(self.side_content(conflict.their.as_ref())?);
            content.extend_from_slice(b">>>>>>> theirs\n");

            let path = String::from_utf8_lossy(&template.path).into_owned();
            let mut entry = clone_entry(template);
            entry.id = self.repo.blob(&content)?;
            entry.file_size = content.len() as u32;
            entry.flags &= !STAGE_MASK;

            index.conflict_remove(Path::new(&path))?;
            index.add(&entry)?;
        }
        Ok(())
    }

    fn side_content(&self, entry: Option<&IndexEntry>) -> StorageResult<Vec<u8>> {
        let Some(entry) = entry else {
            return Ok(Vec::new());
        };

        let mut content = self.repo.find_blob(entry.id)?.content().to_vec();
        if !content.is_empty() && !content.ends_with(b"\n") {
            content.push(b'\n');
        }
        Ok(content)
    }
}

fn clone_entry(entry: &IndexEntry) -> IndexEntry {
    IndexEntry {
        ctime: entry.ctime,
        mtime: entry.mtime,
        dev: entry.dev,
        ino: entry.ino,
        mode: entry.mode,
        uid: entry.uid,
        gid: entry.gid,
        file_size: entry.file_size,
        id: entry.id,
        flags: entry.flags,
        flags_extended: entry.flags_extended,
        path: entry.path.clone(),
    }
}
