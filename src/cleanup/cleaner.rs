//! Applying object maps to internal references.

use std::collections::HashMap;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info};

use crate::cleanup::error::{CleanupError, CleanupResult};
use crate::error::BoxError;
use crate::storage::{ObjectId, ReferenceName, Repository, StorageResult};
use crate::transaction::{TxOpen, Updater};

/// Header line written by `git filter-repo` at the top of its commit map.
const OBJECT_MAP_HEADER: &str = "old                                      new";

/// One record of an object map: `old` was rewritten into `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMapEntry {
    pub old: ObjectId,
    /// all zeros when the object was dropped from history
    pub new: ObjectId,
    /// 1-based line number in the map
    pub line: u64,
}

impl ObjectMapEntry {
    /// Parse a `<old> <new>` record of two full hex object ids.
    pub fn parse(record: &str, line: u64) -> CleanupResult<Self> {
        let invalid = || CleanupError::InvalidObjectMap { line };

        let (old, new) = record.split_once(' ').ok_or_else(invalid)?;
        Ok(Self {
            old: ObjectId::from_hex(old).map_err(|_| invalid())?,
            new: ObjectId::from_hex(new).map_err(|_| invalid())?,
            line,
        })
    }

    /// The object was considered by the rewrite but left as it was.
    pub fn is_unchanged(&self) -> bool {
        self.old == self.new
    }

    pub fn is_removal(&self) -> bool {
        self.new.is_zero()
    }
}

/// Called for every rewritten entry before its references are staged for
/// deletion. Returning an error stops the run and nothing is deleted.
///
/// `is_internal` tells whether any internal reference points at `entry.old`.
pub trait ForEachEntry: Send {
    fn on_entry(&mut self, entry: &ObjectMapEntry, is_internal: bool) -> Result<(), BoxError>;
}

impl<F> ForEachEntry for F
where
    F: FnMut(&ObjectMapEntry, bool) -> Result<(), BoxError> + Send,
{
    fn on_entry(&mut self, entry: &ObjectMapEntry, is_internal: bool) -> Result<(), BoxError> {
        self(entry, is_internal)
    }
}

/// Internal references keyed by the object they point at.
///
/// Git answers name-to-object lookups; the cleaner needs the inverse for
/// every map record, so the namespaces are listed once and inverted.
#[derive(Debug, Clone, Default)]
pub struct RefLookupTable {
    refs: HashMap<ObjectId, Vec<ReferenceName>>,
}

impl RefLookupTable {
    /// List every reference below `prefixes`. No prefixes means no references.
    pub async fn build(repo: &Repository, prefixes: &[String]) -> StorageResult<Self> {
        let mut refs: HashMap<ObjectId, Vec<ReferenceName>> = HashMap::new();
        if prefixes.is_empty() {
            return Ok(Self { refs });
        }

        for (oid, name) in repo.list_references(prefixes).await? {
            refs.entry(oid).or_default().push(name);
        }
        Ok(Self { refs })
    }

    /// References pointing at `oid`, in listing order.
    pub fn get(&self, oid: &ObjectId) -> Option<&[ReferenceName]> {
        self.refs.get(oid).map(Vec::as_slice)
    }

    /// Number of references in the table.
    pub fn len(&self) -> usize {
        self.refs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Outcome of a successful [`Cleaner::apply_object_map`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    /// rewritten entries handed to the deletion logic
    pub entries_processed: u64,
    pub refs_deleted: usize,
}

/// Removes internal references to objects a history rewrite replaced.
pub struct Cleaner {
    repo: Repository,
    table: RefLookupTable,
    for_each: Option<Box<dyn ForEachEntry>>,
}

impl Cleaner {
    /// Snapshot the internal references of `repo` below `prefixes`.
    pub async fn new(
        repo: &Repository,
        prefixes: &[String],
        for_each: Option<Box<dyn ForEachEntry>>,
    ) -> CleanupResult<Self> {
        let table = RefLookupTable::build(repo, prefixes).await?;
        debug!(repository = %repo.path().display(), refs = table.len(), "built internal reference table");

        Ok(Self {
            repo: repo.clone(),
            table,
            for_each,
        })
    }

    pub fn lookup_table(&self) -> &RefLookupTable {
        &self.table
    }

    /// Read the whole object map, then delete every internal reference that
    /// points at a rewritten object in one transaction.
    ///
    /// Any malformed record or callback failure aborts before anything is
    /// deleted.
    pub async fn apply_object_map<R>(mut self, reader: R) -> CleanupResult<CleanupSummary>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut tx = Updater::new(&self.repo);
        let mut summary = CleanupSummary::default();

        let mut buf = Vec::new();
        let mut line = 0u64;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            line += 1;

            let record = std::str::from_utf8(strip_line_ending(&buf))
                .map_err(|_| CleanupError::InvalidObjectMap { line })?;
            if record == OBJECT_MAP_HEADER {
                continue;
            }

            let entry = ObjectMapEntry::parse(record, line)?;
            if entry.is_unchanged() {
                continue;
            }

            self.process_entry(&entry, &mut tx)?;
            summary.entries_processed += 1;
        }

        summary.refs_deleted = tx.updates().len();
        let tx = tx.commit().await?;

        info!(
            repository = %self.repo.path().display(),
            tx_id = %tx.id(),
            entries = summary.entries_processed,
            deleted = summary.refs_deleted,
            "applied object map"
        );
        Ok(summary)
    }

    fn process_entry(&mut self, entry: &ObjectMapEntry, tx: &mut Updater<TxOpen>) -> CleanupResult<()> {
        let refs = self.table.get(&entry.old);

        if let Some(for_each) = self.for_each.as_mut() {
            for_each
                .on_entry(entry, refs.is_some())
                .map_err(CleanupError::Callback)?;
        }

        let Some(refs) = refs else {
            return Ok(());
        };

        info!(sha = %entry.old, refs = ?refs, "removing internal references");
        for name in refs {
            tx.delete(name.clone());
        }
        Ok(())
    }
}

fn strip_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
