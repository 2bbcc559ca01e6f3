//! Shared fixtures for unit tests.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use tempfile::TempDir;

use crate::storage::{Identity, ObjectId, Repository};

/// 2020-07-30T07:45:50+02:00
pub(crate) const FIXED_TIME: i64 = 1_596_087_950;

pub(crate) fn fixed_identity() -> Identity {
    let when = DateTime::parse_from_rfc3339("2020-07-30T07:45:50+02:00")
        .expect("valid timestamp")
        .with_timezone(&FixedOffset::east_opt(2 * 3600).expect("valid offset"));
    Identity::new("Jane Doe", "jane@doe.org", when)
}

/// A fresh non-bare repository opened through the storage layer.
pub(crate) fn setup_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().expect("create temp dir");
    git2::Repository::init(dir.path()).expect("init repository");
    let repo = Repository::open(dir.path()).expect("open repository");
    (dir, repo)
}

/// A fresh bare repository.
pub(crate) fn setup_bare_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().expect("create temp dir");
    git2::Repository::init_bare(dir.path()).expect("init repository");
    let repo = Repository::open(dir.path()).expect("open repository");
    (dir, repo)
}

/// Write a commit whose tree holds exactly `files` (flat, regular files).
pub(crate) fn build_commit(
    repo: &git2::Repository,
    parents: &[ObjectId],
    files: &BTreeMap<&str, &str>,
) -> ObjectId {
    let mut builder = repo.treebuilder(None).expect("treebuilder");
    for (path, content) in files {
        let blob = repo.blob(content.as_bytes()).expect("write blob");
        builder.insert(path, blob, 0o100644).expect("insert entry");
    }
    let tree_id = builder.write().expect("write tree");
    let tree = repo.find_tree(tree_id).expect("find tree");

    let time = git2::Time::new(FIXED_TIME, 120);
    let signature = git2::Signature::new("Scrooge McDuck", "scrooge@mcduck.com", &time).expect("signature");

    let parent_commits: Vec<git2::Commit<'_>> = parents
        .iter()
        .map(|id| repo.find_commit(id.raw()).expect("find parent"))
        .collect();
    let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

    let oid = repo
        .commit(None, &signature, &signature, "message\n", &tree, &parent_refs)
        .expect("write commit");
    ObjectId::new(oid)
}

/// Read the file contents of a commit's tree.
pub(crate) fn read_tree(repo: &git2::Repository, commit: ObjectId) -> BTreeMap<String, String> {
    let commit = repo.find_commit(commit.raw()).expect("find commit");
    let tree = commit.tree().expect("tree");
    tree.iter()
        .map(|entry| {
            let blob = repo.find_blob(entry.id()).expect("find blob");
            (
                entry.name().unwrap_or_default().to_string(),
                String::from_utf8_lossy(blob.content()).into_owned(),
            )
        })
        .collect()
}

/// Point a reference at a commit directly through the library.
pub(crate) fn set_ref(repo: &Repository, name: &str, target: ObjectId) {
    repo.with_repo(|r| {
        r.reference(name, target.raw(), true, "test")?;
        Ok(())
    })
    .expect("write reference");
}
