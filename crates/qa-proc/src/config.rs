//! Configuration types for spawning a child process.
//!
//! This module provides [`ProcessConfig`] for configuring how a command is
//! started and [`ProcSignal`] for the signals the handle can deliver.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Interpreter used to run command lines when none is configured.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Default size of a single `read(2)` on the output pipe.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Upper bound on the bytes returned by one `read_available` call.
pub const DEFAULT_MAX_READ: usize = 1024 * 1024;

/// Configuration for spawning a command line.
///
/// # Example
///
/// ```
/// use qa_proc::ProcessConfig;
///
/// let config = ProcessConfig::builder()
///     .shell("/bin/sh")
///     .working_directory("/tmp")
///     .env("LC_ALL", "C")
///     .build();
/// assert_eq!(config.shell.to_str(), Some("/bin/sh"));
/// ```
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Interpreter the command line is handed to (`<shell> -c <cmd>`).
    pub shell: PathBuf,

    /// Working directory for the child process.
    pub working_directory: Option<PathBuf>,

    /// Environment variables to set for the child process.
    /// If None, inherits from the parent process.
    pub env: Option<HashMap<OsString, OsString>>,

    /// Additional environment variables to add (merged with inherited).
    pub env_add: HashMap<OsString, OsString>,

    /// Environment variables to remove from inherited environment.
    pub env_remove: Vec<OsString>,

    /// Size of a single read from the output pipe.
    pub read_chunk: usize,

    /// Maximum bytes gathered by one non-blocking drain.
    pub max_read: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            working_directory: None,
            env: None,
            env_add: HashMap::new(),
            env_remove: Vec::new(),
            read_chunk: DEFAULT_READ_CHUNK,
            max_read: DEFAULT_MAX_READ,
        }
    }
}

impl ProcessConfig {
    /// Create a new builder for `ProcessConfig`.
    #[must_use]
    pub fn builder() -> ProcessConfigBuilder {
        ProcessConfigBuilder::new()
    }

    /// Create a new `ProcessConfig` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the effective environment for the child process.
    ///
    /// This merges the base environment (inherited or explicit), adds
    /// variables from `env_add`, and removes variables from `env_remove`.
    #[must_use]
    pub fn effective_env(&self) -> HashMap<OsString, OsString> {
        let mut env = self
            .env
            .clone()
            .unwrap_or_else(|| std::env::vars_os().collect());

        env.extend(self.env_add.clone());

        for key in &self.env_remove {
            env.remove(key);
        }

        env
    }
}

/// Builder for [`ProcessConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProcessConfigBuilder {
    config: ProcessConfig,
}

impl ProcessConfigBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interpreter used to run the command line.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.config.shell = shell.into();
        self
    }

    /// Set the working directory for the child process.
    #[must_use]
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_directory = Some(path.into());
        self
    }

    /// Start from an empty environment instead of inheriting.
    #[must_use]
    pub fn env_clear(mut self) -> Self {
        self.config.env = Some(HashMap::new());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.config.env_add.insert(key.into(), value.into());
        self
    }

    /// Remove an environment variable.
    #[must_use]
    pub fn env_remove(mut self, key: impl Into<OsString>) -> Self {
        self.config.env_remove.push(key.into());
        self
    }

    /// Set the size of a single pipe read.
    #[must_use]
    pub const fn read_chunk(mut self, bytes: usize) -> Self {
        self.config.read_chunk = bytes;
        self
    }

    /// Set the maximum number of bytes one drain may return.
    #[must_use]
    pub const fn max_read(mut self, bytes: usize) -> Self {
        self.config.max_read = bytes;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ProcessConfig {
        self.config
    }
}

/// Signals that can be delivered to a child's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProcSignal {
    /// Interrupt signal (SIGINT).
    Interrupt,
    /// Terminate signal (SIGTERM).
    Terminate,
    /// Kill signal, cannot be caught (SIGKILL).
    Kill,
    /// Hangup signal (SIGHUP).
    Hangup,
}

impl ProcSignal {
    /// Get the Unix signal number.
    #[cfg(unix)]
    #[must_use]
    pub const fn as_unix_signal(self) -> i32 {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
            Self::Hangup => libc::SIGHUP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = ProcessConfig::builder()
            .working_directory("/tmp")
            .env("FOO", "bar")
            .read_chunk(512)
            .build();

        assert_eq!(config.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(config.read_chunk, 512);
        assert!(config.env_add.contains_key(&OsString::from("FOO")));
        assert_eq!(config.shell, PathBuf::from(DEFAULT_SHELL));
    }

    #[test]
    fn effective_env_applies_overrides() {
        let config = ProcessConfig::builder()
            .env_clear()
            .env("KEEP", "1")
            .env("DROP", "2")
            .env_remove("DROP")
            .build();

        let env = config.effective_env();
        assert_eq!(env.len(), 1);
        assert_eq!(env.get(&OsString::from("KEEP")), Some(&OsString::from("1")));
    }

    #[cfg(unix)]
    #[test]
    fn signal_numbers() {
        assert_eq!(ProcSignal::Kill.as_unix_signal(), libc::SIGKILL);
        assert_eq!(ProcSignal::Terminate.as_unix_signal(), libc::SIGTERM);
    }
}
