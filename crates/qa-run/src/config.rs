//! Configuration types for qa-run.
//!
//! This module defines the knobs of an interactive run: how long a command
//! may go without progress, how often it is polled, how its result is
//! judged, and the per-run options (working directory, environment, command
//! log, error pattern).
//!
//! Values are layered: built-in defaults, then a TOML file
//! ([`QaConfig::from_toml_str`], [`QaConfig::from_file`]), then `QA_RUN_*`
//! environment variables ([`QaConfig::apply_env`]).

pub mod env;
pub mod file;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use env::EnvConfig;
pub use file::FileConfig;

use crate::error::{QaError, Result};

/// Default number of unproductive polls before a command is killed.
pub const DEFAULT_STALL_THRESHOLD: u32 = 50;

/// Default sleep between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of transcript bytes attached to a stall error.
pub const DEFAULT_TAIL_LEN: usize = 500;

/// Default size of a single read from the command's output.
pub const DEFAULT_READ_SIZE: usize = 8 * 1024;

/// How strictly a finished command is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Accept any exit code; error lines are reported but never fail the run.
    Ignore,
    /// Log a non-zero exit code and error lines, but count the run as a success.
    #[default]
    Warn,
    /// A non-zero exit code or any error line fails the run.
    Error,
}

impl Strictness {
    /// Get the lowercase name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strictness {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(QaError::config(format!(
                "invalid strictness '{other}' (expected ignore, warn or error)"
            ))),
        }
    }
}

/// Settings shared by every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaConfig {
    /// Unproductive polls tolerated before the command is killed.
    pub stall_threshold: u32,
    /// Sleep between polls.
    pub poll_interval: Duration,
    /// How the finished command is judged.
    pub strictness: Strictness,
    /// Interpreter the command line is handed to.
    pub shell: PathBuf,
    /// Transcript bytes attached to a stall error.
    pub tail_len: usize,
    /// Size of a single read from the command's output.
    pub read_size: usize,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            strictness: Strictness::default(),
            shell: PathBuf::from(qa_proc::DEFAULT_SHELL),
            tail_len: DEFAULT_TAIL_LEN,
            read_size: DEFAULT_READ_SIZE,
        }
    }
}

impl QaConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stall threshold.
    #[must_use]
    pub const fn stall_threshold(mut self, polls: u32) -> Self {
        self.stall_threshold = polls;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the strictness level.
    #[must_use]
    pub const fn strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Set the interpreter.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set the length of the transcript tail attached to stall errors.
    #[must_use]
    pub const fn tail_len(mut self, bytes: usize) -> Self {
        self.tail_len = bytes;
        self
    }

    /// Set the read size.
    #[must_use]
    pub const fn read_size(mut self, bytes: usize) -> Self {
        self.read_size = bytes;
        self
    }

    /// Parse a TOML document layered over the defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use qa_run::config::{QaConfig, Strictness};
    ///
    /// let config = QaConfig::from_toml_str("stall_threshold = 10\nstrictness = \"error\"")?;
    /// assert_eq!(config.stall_threshold, 10);
    /// assert_eq!(config.strictness, Strictness::Error);
    /// # Ok::<(), qa_run::QaError>(())
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file = FileConfig::parse(s)?;
        let mut config = Self::default();
        file.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file layered over the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = QaError::with_io_context(
            std::fs::read_to_string(path),
            format!("reading config file {}", path.display()),
        )?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by the process environment (`QA_RUN_*`).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(&EnvConfig::default())?;
        Ok(config)
    }

    /// Override settings from environment variables.
    ///
    /// Unset variables leave the current value alone; set but unparsable
    /// ones are a configuration error.
    pub fn apply_env(&mut self, env: &EnvConfig) -> Result<()> {
        if let Some(threshold) = env.parse_strict::<u32>(env::vars::STALL_THRESHOLD)? {
            self.stall_threshold = threshold;
        }
        if let Some(millis) = env.parse_strict::<u64>(env::vars::POLL_INTERVAL_MS)? {
            self.poll_interval = Duration::from_millis(millis);
        }
        if let Some(strictness) = env.get(env::vars::STRICTNESS) {
            self.strictness = strictness.parse()?;
        }
        if let Some(shell) = env.get(env::vars::SHELL) {
            self.shell = PathBuf::from(shell);
        }
        if let Some(tail_len) = env.parse_strict::<usize>(env::vars::TAIL_LEN)? {
            self.tail_len = tail_len;
        }
        self.validate()
    }

    /// Check that the settings can drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.stall_threshold == 0 {
            return Err(QaError::config("stall_threshold must be at least 1"));
        }
        if self.read_size == 0 {
            return Err(QaError::config("read_size must be at least 1"));
        }
        if self.shell.as_os_str().is_empty() {
            return Err(QaError::config("shell must not be empty"));
        }
        Ok(())
    }
}

/// Which pattern the finished transcript is scanned with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorPattern {
    /// The built-in pattern for `error`, `failed` and `segmentation fault`.
    #[default]
    Default,
    /// A caller-supplied regular expression (matched case-insensitively).
    Custom(String),
    /// Skip scanning entirely.
    Disabled,
}

/// Everything a single run needs besides the command and its table.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use qa_run::{QaConfig, RunOptions, Strictness};
///
/// let options = RunOptions::new()
///     .config(QaConfig::new().stall_threshold(5).poll_interval(Duration::from_millis(50)))
///     .strictness(Strictness::Error)
///     .working_dir("/tmp")
///     .env("LC_ALL", "C");
/// assert_eq!(options.config.stall_threshold, 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Shared settings.
    pub config: QaConfig,
    /// Directory the command runs in; the caller's directory is never changed.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables for the command.
    pub env: HashMap<String, String>,
    /// File receiving the command line and everything it prints.
    pub log_file: Option<PathBuf>,
    /// Pattern used to find error lines in the output.
    pub error_pattern: ErrorPattern,
}

impl RunOptions {
    /// Create options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the shared settings.
    #[must_use]
    pub fn config(mut self, config: QaConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the strictness level.
    #[must_use]
    pub const fn strictness(mut self, strictness: Strictness) -> Self {
        self.config.strictness = strictness;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Log the command and its output to a file.
    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Choose the error pattern.
    #[must_use]
    pub fn error_pattern(mut self, pattern: ErrorPattern) -> Self {
        self.error_pattern = pattern;
        self
    }

    /// Build the spawn configuration for the child.
    #[must_use]
    pub fn process_config(&self) -> qa_proc::ProcessConfig {
        let mut builder = qa_proc::ProcessConfig::builder()
            .shell(self.config.shell.clone())
            .read_chunk(self.config.read_size);
        if let Some(ref dir) = self.working_dir {
            builder = builder.working_directory(dir.clone());
        }
        for (key, value) in &self.env {
            builder = builder.env(key, value);
        }
        builder.build()
    }
}
