//! Reference updater using the typestate pattern.
//!
//! The typestate pattern ensures at compile time that an updater is used
//! correctly:
//! - Only open updaters can stage operations
//! - Committed/aborted updaters cannot be reused
//! - A failed commit consumes the updater, so nothing can be staged after it
//!
//! Committing drives `git update-ref -z --stdin` through its transaction
//! protocol: `start`, the staged operations, `prepare`. Once git reports
//! `prepare: ok` every reference is locked and its expected old value
//! verified, and the repository's [`TransactionHook`] votes on the batch
//! before `commit` (or `abort`) is sent.

use std::marker::PhantomData;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::storage::{GitCommand, ObjectId, ReferenceName, Repository, StorageError};
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::hook::{RefOperation, RefUpdate, TransactionHook};

/// Marker type for updaters that still accept operations.
#[derive(Debug)]
pub struct TxOpen;

/// Marker type for committed updaters.
#[derive(Debug)]
pub struct TxCommitted;

/// Marker type for discarded updaters.
#[derive(Debug)]
pub struct TxAborted;

/// A batch of reference operations applied all-or-nothing.
///
/// The `State` parameter tracks whether the batch is:
/// - `TxOpen`: operations can be staged
/// - `TxCommitted`: every operation was applied
/// - `TxAborted`: discarded without touching the repository
pub struct Updater<State> {
    repo: Repository,
    tx_id: Ulid,
    updates: Vec<RefUpdate>,
    hook_enabled: bool,
    _state: PhantomData<State>,
}

impl<State> Updater<State> {
    /// Unique id of this transaction, also recorded in log events.
    pub fn id(&self) -> Ulid {
        self.tx_id
    }

    /// Staged operations, in staging order.
    pub fn updates(&self) -> &[RefUpdate] {
        &self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    fn into_state<Next>(self) -> Updater<Next> {
        Updater {
            repo: self.repo,
            tx_id: self.tx_id,
            updates: self.updates,
            hook_enabled: self.hook_enabled,
            _state: PhantomData,
        }
    }
}

impl Updater<TxOpen> {
    /// Start an empty transaction against `repo`.
    pub fn new(repo: &Repository) -> Self {
        Self {
            repo: repo.clone(),
            tx_id: Ulid::new(),
            updates: Vec::new(),
            hook_enabled: true,
            _state: PhantomData,
        }
    }

    /// Skip the transaction hook on commit.
    ///
    /// Meant for repository-internal bookkeeping that no replica votes on.
    pub fn without_transactions(mut self) -> Self {
        self.hook_enabled = false;
        self
    }

    /// Stage creation of a reference that must not exist yet.
    pub fn create(&mut self, name: ReferenceName, new: ObjectId) -> &mut Self {
        self.stage(name, RefOperation::Create { new })
    }

    /// Stage moving a reference to `new`, verifying `old` when given.
    pub fn update(&mut self, name: ReferenceName, old: Option<ObjectId>, new: ObjectId) -> &mut Self {
        self.stage(name, RefOperation::Update { old, new })
    }

    /// Stage deletion of a reference.
    pub fn delete(&mut self, name: ReferenceName) -> &mut Self {
        self.stage(name, RefOperation::Delete { old: None })
    }

    /// Stage deletion of a reference that must currently point at `old`.
    pub fn delete_expecting(&mut self, name: ReferenceName, old: ObjectId) -> &mut Self {
        self.stage(name, RefOperation::Delete { old: Some(old) })
    }

    // the last operation staged for a name wins, keeping its first position
    fn stage(&mut self, name: ReferenceName, operation: RefOperation) -> &mut Self {
        match self.updates.iter_mut().find(|u| u.name == name) {
            Some(existing) => existing.operation = operation,
            None => self.updates.push(RefUpdate { name, operation }),
        }
        self
    }

    /// Discard every staged operation.
    pub fn rollback(self) -> Updater<TxAborted> {
        debug!(tx_id = %self.tx_id, discarded = self.updates.len(), "reference transaction rolled back");
        self.into_state()
    }

    /// Apply every staged operation atomically.
    ///
    /// On error no reference was changed. Committing an empty transaction
    /// succeeds without running anything.
    ///
    /// When the command timeout expires the transaction is aborted and
    /// `update-ref` is given a few seconds to release its locks before it
    /// is killed.
    pub async fn commit(self) -> TransactionResult<Updater<TxCommitted>> {
        if self.updates.is_empty() {
            debug!(tx_id = %self.tx_id, "empty reference transaction");
            return Ok(self.into_state());
        }

        let cmd = GitCommand::new("update-ref").flag("-z").flag("--stdin");
        let hook = self.hook_enabled.then(|| self.repo.transaction_hook());
        let mut session = Session::start(&self.repo, &cmd)?;

        match self.repo.git_config().command_timeout() {
            Some(timeout) => {
                let outcome = tokio::time::timeout(timeout, self.exchange(&mut session, hook)).await;
                match outcome {
                    Ok(result) => result?,
                    Err(_) => self.cancel(session, &cmd, timeout).await?,
                }
            }
            None => self.exchange(&mut session, hook).await?,
        }

        info!(
            tx_id = %self.tx_id,
            repository = %self.repo.path().display(),
            updates = self.updates.len(),
            "reference transaction committed"
        );
        Ok(self.into_state())
    }

    async fn exchange(
        &self,
        session: &mut Session,
        hook: Option<Arc<dyn TransactionHook>>,
    ) -> TransactionResult<()> {
        let mut batch = b"start\0".to_vec();
        for update in &self.updates {
            update.encode(&mut batch);
        }
        batch.extend_from_slice(b"prepare\0");

        // git exits on the first rejected operation, which can break the pipe
        let written = session.write(&batch).await.is_ok();
        let prepared = written
            && session.read_status("start: ok").await?
            && session.read_status("prepare: ok").await?;
        if !prepared {
            session.close_stdin();
            return Err(session.rejected().await);
        }

        if let Some(hook) = hook {
            if let Err(source) = hook.vote(&self.updates).await {
                warn!(tx_id = %self.tx_id, error = %source, "transaction hook rejected reference update");
                if let Err(e) = session.write(b"abort\0").await {
                    debug!(tx_id = %self.tx_id, error = %e, "could not send abort");
                }
                session.close_stdin();
                if let Err(e) = session.wait().await {
                    debug!(tx_id = %self.tx_id, error = %e, "could not reap update-ref");
                }
                return Err(TransactionError::HookRejected { source });
            }
        }

        session.committing = true;
        session.write(b"commit\0").await.map_err(StorageError::from)?;
        session.close_stdin();

        if !session.read_status("commit: ok").await? {
            return Err(session.rejected().await);
        }

        let status = session.wait().await.map_err(StorageError::from)?;
        if !status.success() {
            return Err(session.rejected().await);
        }
        Ok(())
    }

    /// Stop an exchange whose deadline expired.
    ///
    /// Before `commit` is sent, end of input makes git abort the prepared
    /// transaction and delete its lock files. After it, git finishes on its
    /// own and its exit status tells whether the references were written.
    async fn cancel(&self, mut session: Session, cmd: &GitCommand, timeout: Duration) -> TransactionResult<()> {
        let committing = session.committing;
        session.close_stdin();

        let exited = match tokio::time::timeout(ABORT_GRACE, session.wait()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(tx_id = %self.tx_id, error = %e, "could not reap update-ref");
                false
            }
            Err(_) => {
                warn!(tx_id = %self.tx_id, "update-ref ignored abort, killing it");
                if let Err(e) = session.kill().await {
                    debug!(tx_id = %self.tx_id, error = %e, "could not kill update-ref");
                }
                false
            }
        };

        if committing && exited {
            warn!(tx_id = %self.tx_id, "reference transaction committed after its deadline");
            return Ok(());
        }

        warn!(tx_id = %self.tx_id, timeout_ms = timeout.as_millis() as u64, "reference transaction cancelled");
        Err(StorageError::Cancelled {
            command: cmd.name().to_string(),
            timeout,
        }
        .into())
    }
}

/// How long an aborted `update-ref` may take to release its locks.
const ABORT_GRACE: Duration = Duration::from_secs(5);

/// A running `git update-ref -z --stdin` and its pipes.
///
/// Owned by [`Updater::commit`] rather than by the exchange future, so the
/// process outlives a cancelled exchange and can be shut down cleanly.
/// Dropping a session whose process is still running closes its input and
/// leaves the process [`ABORT_GRACE`] to abort before it is killed.
struct Session {
    /// `None` once handed to the shutdown task
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr: Option<ChildStderr>,
    /// `commit` has been (or is being) sent
    committing: bool,
}

impl Session {
    fn start(repo: &Repository, cmd: &GitCommand) -> TransactionResult<Self> {
        let mut child = repo.spawn(cmd)?;
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(StorageError::Internal("update-ref pipes were not captured".to_string()).into());
        };

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            stderr: Some(stderr),
            committing: false,
        })
    }

    async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        };
        stdin.write_all(data).await?;
        stdin.flush().await
    }

    fn close_stdin(&mut self) {
        drop(self.stdin.take());
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        match self.child.as_mut() {
            Some(child) => child.wait().await,
            None => Err(std::io::Error::other("update-ref was already reaped")),
        }
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        match self.child.as_mut() {
            Some(child) => child.kill().await,
            None => Ok(()),
        }
    }

    /// Read one status line. `false` means git closed its output instead.
    async fn read_status(&mut self, expected: &str) -> TransactionResult<bool> {
        let mut line = String::new();
        let read = self.stdout.read_line(&mut line).await.map_err(StorageError::from)?;
        if read == 0 {
            return Ok(false);
        }

        let got = line.trim_end();
        if got != expected {
            return Err(TransactionError::Protocol {
                expected: expected.to_string(),
                got: got.to_string(),
            });
        }
        Ok(true)
    }

    async fn rejected(&mut self) -> TransactionError {
        let mut captured = Vec::new();
        if let Some(mut stderr) = self.stderr.take() {
            if let Err(e) = stderr.read_to_end(&mut captured).await {
                debug!(error = %e, "could not read update-ref stderr");
            }
        }
        if let Err(e) = self.wait().await {
            debug!(error = %e, "could not reap update-ref");
        }

        TransactionError::ReferenceUpdate {
            stderr: String::from_utf8_lossy(&captured).trim().to_string(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }

        // end of input before `commit` aborts the transaction and unlocks
        self.close_stdin();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            if tokio::time::timeout(ABORT_GRACE, child.wait()).await.is_err() {
                warn!("update-ref ignored abort, killing it");
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "could not kill update-ref");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::config::GitConfig;
    use crate::error::{BoxError, ErrorKind};
    use crate::testutil::{build_commit, set_ref, setup_repo};

    #[derive(Default)]
    struct RecordingHook {
        batches: Mutex<Vec<Vec<RefUpdate>>>,
    }

    #[async_trait]
    impl TransactionHook for RecordingHook {
        async fn vote(&self, updates: &[RefUpdate]) -> Result<(), BoxError> {
            self.batches.lock().push(updates.to_vec());
            Ok(())
        }
    }

    struct RejectingHook;

    #[async_trait]
    impl TransactionHook for RejectingHook {
        async fn vote(&self, _updates: &[RefUpdate]) -> Result<(), BoxError> {
            Err("vote failed".into())
        }
    }

    fn name(s: &str) -> ReferenceName {
        ReferenceName::new(s).unwrap()
    }

    fn setup() -> (tempfile::TempDir, Repository, [ObjectId; 3]) {
        let (dir, repo) = setup_repo();
        let commits = repo
            .with_repo(|r| {
                let c1 = build_commit(r, &[], &BTreeMap::from([("file", "1")]));
                let c2 = build_commit(r, &[c1], &BTreeMap::from([("file", "2")]));
                let c3 = build_commit(r, &[c2], &BTreeMap::from([("file", "3")]));
                Ok([c1, c2, c3])
            })
            .unwrap();
        (dir, repo, commits)
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let (_dir, repo, [c1, c2, _]) = setup();

        let mut tx = Updater::new(&repo);
        tx.create(name("refs/heads/feature"), c1)
            .create(name("refs/keep-around/x"), c1);
        tx.commit().await.unwrap();
        assert_eq!(repo.find_reference(&name("refs/heads/feature")).unwrap(), Some(c1));

        let mut tx = Updater::new(&repo);
        tx.update(name("refs/heads/feature"), Some(c1), c2)
            .delete(name("refs/keep-around/x"));
        tx.commit().await.unwrap();

        assert_eq!(repo.find_reference(&name("refs/heads/feature")).unwrap(), Some(c2));
        assert_eq!(repo.find_reference(&name("refs/keep-around/x")).unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_old_value_rejects_whole_batch() {
        let (_dir, repo, [c1, c2, c3]) = setup();
        set_ref(&repo, "refs/heads/main", c1);

        let mut tx = Updater::new(&repo);
        tx.create(name("refs/heads/new"), c1)
            .update(name("refs/heads/main"), Some(c2), c3);
        let err = tx.commit().await.err().unwrap();

        assert!(matches!(err, TransactionError::ReferenceUpdate { .. }));
        assert_eq!(err.kind(), ErrorKind::ReferenceUpdateFailure);
        assert_eq!(repo.find_reference(&name("refs/heads/new")).unwrap(), None);
        assert_eq!(repo.find_reference(&name("refs/heads/main")).unwrap(), Some(c1));
    }

    #[tokio::test]
    async fn test_create_existing_reference_fails() {
        let (_dir, repo, [c1, c2, _]) = setup();
        set_ref(&repo, "refs/heads/main", c1);

        let mut tx = Updater::new(&repo);
        tx.create(name("refs/heads/main"), c2);
        let err = tx.commit().await.err().unwrap();

        match err {
            TransactionError::ReferenceUpdate { stderr } => assert!(!stderr.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(repo.find_reference(&name("refs/heads/main")).unwrap(), Some(c1));
    }

    #[tokio::test]
    async fn test_empty_commit_is_noop() {
        let (_dir, repo, _) = setup();
        let hook = Arc::new(RecordingHook::default());
        let repo = repo.with_transaction_hook(hook.clone());

        let committed = Updater::new(&repo).commit().await.unwrap();
        assert!(committed.is_empty());
        assert!(hook.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (_dir, repo, [c1, c2, c3]) = setup();

        let mut tx = Updater::new(&repo);
        tx.create(name("refs/tmp/a"), c1)
            .create(name("refs/tmp/b"), c3)
            .create(name("refs/tmp/a"), c2);
        assert_eq!(tx.updates().len(), 2);
        assert_eq!(tx.updates()[0].name.as_str(), "refs/tmp/a");
        assert_eq!(tx.updates()[0].new_value(), Some(c2));

        tx.commit().await.unwrap();
        assert_eq!(repo.find_reference(&name("refs/tmp/a")).unwrap(), Some(c2));
    }

    #[tokio::test]
    async fn test_hook_invoked_once_with_batch() {
        let (_dir, repo, [c1, c2, _]) = setup();
        let hook = Arc::new(RecordingHook::default());
        let repo = repo.with_transaction_hook(hook.clone());

        let mut tx = Updater::new(&repo);
        tx.create(name("refs/heads/a"), c1).create(name("refs/heads/b"), c2);
        tx.commit().await.unwrap();

        let batches = hook.batches.lock();
        assert_eq!(batches.len(), 1);
        let names: Vec<_> = batches[0].iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["refs/heads/a", "refs/heads/b"]);
    }

    #[tokio::test]
    async fn test_hook_rejection_leaves_references_unchanged() {
        let (_dir, repo, [c1, c2, _]) = setup();
        set_ref(&repo, "refs/heads/main", c1);
        let repo = repo.with_transaction_hook(Arc::new(RejectingHook));

        let mut tx = Updater::new(&repo);
        tx.update(name("refs/heads/main"), Some(c1), c2)
            .create(name("refs/heads/other"), c2);
        let err = tx.commit().await.err().unwrap();

        assert_eq!(err.kind(), ErrorKind::TransactionHookFailure);
        assert_eq!(repo.find_reference(&name("refs/heads/main")).unwrap(), Some(c1));
        assert_eq!(repo.find_reference(&name("refs/heads/other")).unwrap(), None);

        // the aborted transaction must not leave locks behind
        let mut tx = Updater::new(&repo).without_transactions();
        tx.update(name("refs/heads/main"), Some(c1), c2);
        tx.commit().await.unwrap();
        assert_eq!(repo.find_reference(&name("refs/heads/main")).unwrap(), Some(c2));
    }

    struct SlowHook(Duration);

    #[async_trait]
    impl TransactionHook for SlowHook {
        async fn vote(&self, _updates: &[RefUpdate]) -> Result<(), BoxError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_deadline_during_vote_releases_locks() {
        let (dir, repo, [c1, c2, c3]) = setup();
        set_ref(&repo, "refs/heads/main", c1);

        let git = GitConfig {
            command_timeout_ms: Some(300),
            ..GitConfig::default()
        };
        let slow = Repository::open_with_config(dir.path(), &git)
            .unwrap()
            .with_transaction_hook(Arc::new(SlowHook(Duration::from_secs(2))));

        let mut tx = Updater::new(&slow);
        tx.update(name("refs/heads/main"), Some(c1), c2);
        let err = tx.commit().await.err().unwrap();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(!slow.git_dir().join("refs/heads/main.lock").exists());
        assert_eq!(repo.find_reference(&name("refs/heads/main")).unwrap(), Some(c1));

        // the reference is not wedged for later transactions
        let mut tx = Updater::new(&slow).without_transactions();
        tx.update(name("refs/heads/main"), Some(c1), c3);
        tx.commit().await.unwrap();
        assert_eq!(repo.find_reference(&name("refs/heads/main")).unwrap(), Some(c3));
    }

    #[tokio::test]
    async fn test_dropped_commit_releases_locks() {
        let (_dir, repo, [c1, c2, _]) = setup();
        set_ref(&repo, "refs/heads/main", c1);
        let slow = repo
            .clone()
            .with_transaction_hook(Arc::new(SlowHook(Duration::from_secs(5))));

        let mut tx = Updater::new(&slow);
        tx.update(name("refs/heads/main"), Some(c1), c2);
        let outcome = tokio::time::timeout(Duration::from_millis(300), tx.commit()).await;
        assert!(outcome.is_err());

        let lock = repo.git_dir().join("refs/heads/main.lock");
        for _ in 0..50 {
            if !lock.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!lock.exists());
        assert_eq!(repo.find_reference(&name("refs/heads/main")).unwrap(), Some(c1));
    }

    #[tokio::test]
    async fn test_without_transactions_skips_hook() {
        let (_dir, repo, [c1, _, _]) = setup();
        let hook = Arc::new(RecordingHook::default());
        let repo = repo.with_transaction_hook(hook.clone());

        let mut tx = Updater::new(&repo).without_transactions();
        tx.create(name("refs/dangling/x"), c1);
        tx.commit().await.unwrap();

        assert!(hook.batches.lock().is_empty());
        assert_eq!(repo.find_reference(&name("refs/dangling/x")).unwrap(), Some(c1));
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let (_dir, repo, [c1, _, _]) = setup();

        let mut tx = Updater::new(&repo);
        tx.create(name("refs/heads/gone"), c1);
        let aborted = tx.rollback();

        assert_eq!(aborted.updates().len(), 1);
        assert_eq!(repo.find_reference(&name("refs/heads/gone")).unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_updates_one_wins() {
        let (_dir, repo, [c1, c2, c3]) = setup();
        set_ref(&repo, "refs/heads/main", c1);

        let mut first = Updater::new(&repo);
        first.update(name("refs/heads/main"), Some(c1), c2);
        let mut second = Updater::new(&repo);
        second.update(name("refs/heads/main"), Some(c1), c3);

        let (a, b) = tokio::join!(first.commit(), second.commit());
        let winners: Vec<ObjectId> = [(a.is_ok(), c2), (b.is_ok(), c3)]
            .into_iter()
            .filter_map(|(ok, value)| ok.then_some(value))
            .collect();

        assert_eq!(winners.len(), 1);
        for result in [a.err(), b.err()].into_iter().flatten() {
            assert_eq!(result.kind(), ErrorKind::ReferenceUpdateFailure);
        }
        assert_eq!(repo.find_reference(&name("refs/heads/main")).unwrap(), Some(winners[0]));
    }
}
