//! Git subcommand descriptions and their captured output.
//!
//! A [`GitCommand`] only describes an invocation; running it is the job of
//! [`Repository::exec`](crate::storage::Repository::exec) and
//! [`Repository::spawn`](crate::storage::Repository::spawn), which add the
//! repository location, the deadline and kill-on-drop cancellation.

use std::ffi::OsString;
use std::fmt;

/// builder for a single git subcommand invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    name: String,
    flags: Vec<String>,
    args: Vec<OsString>,
    config: Vec<(String, String)>,
}

impl GitCommand {
    /// create a new invocation of `git <name>`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: Vec::new(),
            args: Vec::new(),
            config: Vec::new(),
        }
    }

    /// add a flag, e.g. `--quiet` or `--format=%(refname)`
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// add a positional argument; paths are passed through without
    /// conversion
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// inject a `-c key=value` pair for this invocation only
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.push((key.into(), value.into()));
        self
    }

    /// the subcommand name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// the argument vector passed after `git -C <path>`
    pub(crate) fn to_args(&self) -> Vec<OsString> {
        let mut out = Vec::with_capacity(self.config.len() * 2 + self.flags.len() + self.args.len() + 1);
        for (key, value) in &self.config {
            out.push("-c".into());
            out.push(format!("{}={}", key, value).into());
        }
        out.push(self.name.as_str().into());
        out.extend(self.flags.iter().map(OsString::from));
        out.extend(self.args.iter().cloned());
        out
    }
}

impl fmt::Display for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<_> = self.to_args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        write!(f, "{}", args.join(" "))
    }
}

/// captured output of a successful git invocation
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// stdout split into lines, lossily decoded
    pub fn stdout_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.stdout
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}
