//! Environment-based configuration.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{QaError, Result};

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "QA_RUN";

/// Environment variable reader.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Values that shadow the process environment.
    overrides: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: HashMap::new(),
        }
    }

    /// Shadow a variable without touching the process environment.
    #[must_use]
    pub fn with_override(mut self, name: &str, value: impl Into<String>) -> Self {
        self.overrides.insert(self.var_name(name), value.into());
        self
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        self.overrides
            .get(&var_name)
            .cloned()
            .or_else(|| std::env::var(&var_name).ok())
    }

    /// Get a parsed value, ignoring values that fail to parse.
    #[must_use]
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Get a parsed value; a set but unparsable value is an error.
    pub fn parse_strict<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                QaError::config(format!("invalid value '{raw}' for {}", self.var_name(name)))
            }),
        }
    }

    /// Get a duration in milliseconds.
    #[must_use]
    pub fn duration_millis(&self, name: &str) -> Option<Duration> {
        self.parse::<u64>(name).map(Duration::from_millis)
    }

    /// Check if a variable is set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Variables understood by [`QaConfig::apply_env`](super::QaConfig::apply_env).
pub mod vars {
    /// Unproductive polls before a command is killed.
    pub const STALL_THRESHOLD: &str = "STALL_THRESHOLD";
    /// Sleep between polls, in milliseconds.
    pub const POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
    /// `ignore`, `warn` or `error`.
    pub const STRICTNESS: &str = "STRICTNESS";
    /// Interpreter for command lines.
    pub const SHELL: &str = "SHELL";
    /// Bytes of transcript attached to a stall error.
    pub const TAIL_LEN: &str = "TAIL_LEN";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_name_uses_prefix() {
        let env = EnvConfig::default();
        assert_eq!(env.var_name("stall_threshold"), "QA_RUN_STALL_THRESHOLD");

        let bare = EnvConfig::new("");
        assert_eq!(bare.var_name("shell"), "SHELL");
    }

    #[test]
    fn overrides_shadow_environment() {
        let env = EnvConfig::new("QA_TEST_SHADOW").with_override("poll_interval_ms", "40");
        assert!(env.is_set(vars::POLL_INTERVAL_MS));
        assert_eq!(
            env.duration_millis(vars::POLL_INTERVAL_MS),
            Some(Duration::from_millis(40))
        );
        assert!(!env.is_set(vars::TAIL_LEN));
    }

    #[test]
    fn parse_lenient_and_strict() {
        let env = EnvConfig::new("QA_TEST_PARSE").with_override("tail_len", "lots");
        assert_eq!(env.parse::<usize>(vars::TAIL_LEN), None);
        assert!(env.parse_strict::<usize>(vars::TAIL_LEN).is_err());
        assert_eq!(env.parse_strict::<usize>(vars::STALL_THRESHOLD).unwrap(), None);
    }
}
