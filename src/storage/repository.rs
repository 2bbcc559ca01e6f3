//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer.  It wraps `git2::Repository`
//!   with thread-safe access, runs `git` subprocesses against the same
//!  repository, and carries the transaction hook that reference updates call.
//!
//! All other modules use this for Git access.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::config::GitConfig;
use crate::storage::command::{CommandOutput, GitCommand};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::types::{ObjectId, ReferenceName};
use crate::transaction::{NoopHook, TransactionHook};

/// The main Git repository wrapper.
///
/// Clone this to share across threads - it uses Arc internally. Library
/// access is serialized through a mutex because `git2::Repository` is not
/// `Sync`; subprocesses run without holding it.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
    git: GitConfig,
    hook: Arc<dyn TransactionHook>,
}

struct RepositoryInner {
    repo: Mutex<git2::Repository>,
    path: PathBuf,
    git_dir: PathBuf,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.inner.path)
            .finish()
    }
}

impl Repository {
    /// Open an existing repository with the default git settings.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, &GitConfig::default())
    }

    /// Open an existing repository.
    pub fn open_with_config(path: impl AsRef<Path>, git: &GitConfig) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = git2::Repository::open(path)
            .map_err(|_| StorageError::NotARepository(path.to_path_buf()))?;
        Ok(Self::from_git2(repo, path, git))
    }

    /// Initialize a new bare repository, or open it if one already exists.
    pub fn init_bare(path: impl AsRef<Path>, git: &GitConfig) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = match git2::Repository::open_bare(path) {
            Ok(repo) => repo,
            Err(_) => git2::Repository::init_bare(path)?,
        };
        Ok(Self::from_git2(repo, path, git))
    }

    fn from_git2(repo: git2::Repository, path: &Path, git: &GitConfig) -> Self {
        let git_dir = repo.path().to_path_buf();
        Self {
            inner: Arc::new(RepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
                git_dir,
            }),
            git: git.clone(),
            hook: Arc::new(NoopHook),
        }
    }

    /// Replace the hook invoked once per committed reference transaction.
    pub fn with_transaction_hook(mut self, hook: Arc<dyn TransactionHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Get the repository path as it was opened.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Get the git directory (the repository itself when bare).
    pub fn git_dir(&self) -> &Path {
        &self.inner.git_dir
    }

    pub fn git_config(&self) -> &GitConfig {
        &self.git
    }

    pub(crate) fn transaction_hook(&self) -> Arc<dyn TransactionHook> {
        Arc::clone(&self.hook)
    }

    /// Execute a function with access to the library handle.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&git2::Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    // ==================== Resolution ====================

    /// Resolve a revision string to the commit it names.
    pub fn resolve_revision(&self, revision: &str) -> StorageResult<ObjectId> {
        self.with_repo(|repo| RefManager::resolve_revision(repo, revision))
    }

    /// Read the current target of a reference, if it exists.
    pub fn find_reference(&self, name: &ReferenceName) -> StorageResult<Option<ObjectId>> {
        self.with_repo(|repo| RefManager::find(repo, name))
    }

    /// List every reference below the given prefixes as `(target, name)` pairs.
    pub async fn list_references(
        &self,
        prefixes: &[String],
    ) -> StorageResult<Vec<(ObjectId, ReferenceName)>> {
        let cmd = GitCommand::new("for-each-ref")
            .flag("--format=%(objectname) %(refname)")
            .args(prefixes.iter().cloned());
        let output = self.exec(cmd).await?;
        RefManager::parse_listing("for-each-ref", &output)
    }

    // ==================== Subprocesses ====================

    fn command(&self, cmd: &GitCommand) -> Command {
        let mut command = Command::new(&self.git.binary);
        command
            .arg("-C")
            .arg(&self.inner.path)
            .args(cmd.to_args())
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        command
    }

    /// Run a git subcommand to completion, capturing stdout and stderr.
    ///
    /// A non-zero exit becomes [`StorageError::Command`] carrying stderr.
    pub async fn exec(&self, cmd: GitCommand) -> StorageResult<CommandOutput> {
        debug!(repository = %self.path().display(), command = %cmd, "running git");

        let mut command = self.command(&cmd);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|source| StorageError::Spawn {
            command: cmd.name().to_string(),
            source,
        })?;
        let output = self.with_deadline(&cmd, child.wait_with_output()).await?;

        let captured = CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        };
        if !output.status.success() {
            return Err(StorageError::Command {
                command: cmd.name().to_string(),
                code: output.status.code(),
                stderr: captured.stderr_str(),
            });
        }

        Ok(captured)
    }

    /// Start a git subcommand with piped stdin, stdout and stderr.
    ///
    /// The child is killed if it is dropped before it exits.
    pub fn spawn(&self, cmd: &GitCommand) -> StorageResult<Child> {
        debug!(repository = %self.path().display(), command = %cmd, "spawning git");

        let mut command = self.command(cmd);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command.spawn().map_err(|source| StorageError::Spawn {
            command: cmd.name().to_string(),
            source,
        })
    }

    /// Bound an I/O future by the configured command timeout.
    pub(crate) async fn with_deadline<F, T>(&self, cmd: &GitCommand, fut: F) -> StorageResult<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match self.git.command_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result.map_err(StorageError::from),
                Err(_) => Err(StorageError::Cancelled {
                    command: cmd.name().to_string(),
                    timeout,
                }),
            },
            None => fut.await.map_err(StorageError::from),
        }
    }
}
