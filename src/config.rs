//! Runtime configuration.
//!
//! Every section has working defaults, so an empty TOML document (or no
//! document at all) yields a usable [`Config`].
//!
//! ```toml
//! [git]
//! binary = "/usr/bin/git"
//! command_timeout_ms = 600000
//!
//! [merge]
//! recursion_limit = 20
//!
//! [pool]
//! stale_lock_grace_secs = 3600
//!
//! [cleanup]
//! internal_ref_prefixes = ["refs/keep-around/", "refs/merge-requests/"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::merge::MERGE_RECURSION_LIMIT;

/// Internal reference namespaces scanned by the cleaner.
pub const INTERNAL_REF_PREFIXES: [&str; 5] = [
    "refs/environments/",
    "refs/keep-around/",
    "refs/merge-requests/",
    "refs/pipelines/",
    "refs/tmp/",
];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub git: GitConfig,
    pub merge: MergeConfig,
    pub pool: PoolConfig,
    pub cleanup: CleanupConfig,
}

/// How git subprocesses are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// git executable, resolved through `PATH` when relative
    pub binary: PathBuf,
    /// deadline for a single subprocess; `None` waits indefinitely
    pub command_timeout_ms: Option<u64>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            command_timeout_ms: None,
        }
    }
}

impl GitConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// how many virtual merge bases may be folded before one base is picked
    pub recursion_limit: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            recursion_limit: MERGE_RECURSION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// lock files older than this are considered abandoned
    pub stale_lock_grace_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            stale_lock_grace_secs: 60 * 60,
        }
    }
}

impl PoolConfig {
    pub fn stale_lock_grace(&self) -> Duration {
        Duration::from_secs(self.stale_lock_grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub internal_ref_prefixes: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            internal_ref_prefixes: INTERNAL_REF_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Config {
    /// Parse configuration from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.git.binary.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("git.binary cannot be empty".to_string()));
        }
        if self.git.command_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "git.command_timeout_ms must be positive".to_string(),
            ));
        }
        if let Some(prefix) = self
            .cleanup
            .internal_ref_prefixes
            .iter()
            .find(|p| !p.starts_with("refs/") || !p.ends_with('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "internal ref prefix must look like refs/<name>/: {}",
                prefix
            )));
        }
        Ok(())
    }

    /// Set the git executable.
    pub fn git_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.git.binary = binary.into();
        self
    }

    /// Set the per-subprocess deadline.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.git.command_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the merge recursion limit.
    pub fn recursion_limit(mut self, limit: u32) -> Self {
        self.merge.recursion_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.git.binary, PathBuf::from("git"));
        assert_eq!(config.git.command_timeout(), None);
        assert_eq!(config.merge.recursion_limit, 20);
        assert_eq!(config.pool.stale_lock_grace(), Duration::from_secs(3600));
        assert_eq!(config.cleanup.internal_ref_prefixes.len(), 5);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_toml_str(
            r#"
            [git]
            command_timeout_ms = 1500

            [merge]
            recursion_limit = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.git.command_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.git.binary, PathBuf::from("git"));
        assert_eq!(config.merge.recursion_limit, 4);
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let result = Config::from_toml_str(
            r#"
            [cleanup]
            internal_ref_prefixes = ["keep-around"]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_builder() {
        let config = Config::default()
            .git_binary("/opt/git/bin/git")
            .command_timeout(Duration::from_secs(2))
            .recursion_limit(3);

        assert_eq!(config.git.binary, PathBuf::from("/opt/git/bin/git"));
        assert_eq!(config.git.command_timeout_ms, Some(2000));
        assert_eq!(config.merge.recursion_limit, 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("refguard.toml");
        std::fs::write(&path, "[pool]\nstale_lock_grace_secs = 10\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.pool.stale_lock_grace(), Duration::from_secs(10));

        let missing = Config::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
