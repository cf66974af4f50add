//! File-based configuration loading.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{QaConfig, Strictness};
use crate::error::{QaError, Result};

/// The TOML shape of [`QaConfig`]; every key is optional.
///
/// ```toml
/// stall_threshold = 50
/// poll_interval_ms = 1000
/// strictness = "warn"
/// shell = "/bin/bash"
/// tail_len = 500
/// read_size = 8192
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Unproductive polls before a command is killed.
    pub stall_threshold: Option<u32>,
    /// Sleep between polls, in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// How a finished command is judged.
    pub strictness: Option<Strictness>,
    /// Interpreter for command lines.
    pub shell: Option<PathBuf>,
    /// Bytes of transcript attached to a stall error.
    pub tail_len: Option<usize>,
    /// Size of a single output read.
    pub read_size: Option<usize>,
}

impl FileConfig {
    /// Parse a TOML document.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| QaError::config(format!("invalid TOML config: {e}")))
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| QaError::config(format!("cannot serialize config: {e}")))
    }

    /// Copy every key that is present onto `config`.
    pub fn apply(&self, config: &mut QaConfig) {
        if let Some(threshold) = self.stall_threshold {
            config.stall_threshold = threshold;
        }
        if let Some(millis) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(millis);
        }
        if let Some(strictness) = self.strictness {
            config.strictness = strictness;
        }
        if let Some(ref shell) = self.shell {
            config.shell.clone_from(shell);
        }
        if let Some(tail_len) = self.tail_len {
            config.tail_len = tail_len;
        }
        if let Some(read_size) = self.read_size {
            config.read_size = read_size;
        }
    }
}

impl From<&QaConfig> for FileConfig {
    fn from(config: &QaConfig) -> Self {
        Self {
            stall_threshold: Some(config.stall_threshold),
            poll_interval_ms: Some(config.poll_interval.as_millis() as u64),
            strictness: Some(config.strictness),
            shell: Some(config.shell.clone()),
            tail_len: Some(config.tail_len),
            read_size: Some(config.read_size),
        }
    }
}
