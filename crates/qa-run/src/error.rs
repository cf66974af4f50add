//! Error types for qa-run.
//!
//! This module defines all error types used throughout the library.
//! Errors carry enough context to diagnose a failed run without re-running
//! it: a stalled command reports the tail of its transcript, which usually
//! shows the prompt that nobody answered.

use std::io;

use thiserror::Error;

/// Maximum length of transcript content to display in error messages.
const MAX_TAIL_DISPLAY: usize = 500;

/// Number of trailing lines shown when the tail is long.
const CONTEXT_LINES: usize = 6;

/// Format transcript content for display, truncating if necessary.
fn format_tail_snippet(tail: &str) -> String {
    if tail.is_empty() {
        return "(no output)".to_string();
    }

    let tail_len = tail.len();
    let lines: Vec<&str> = tail.lines().collect();

    if tail_len <= MAX_TAIL_DISPLAY || lines.len() <= CONTEXT_LINES {
        return format!(
            "┌─ output tail ({} bytes) ─────────────────\n│ {}\n└────────────────────────────────────────",
            tail_len,
            lines.join("\n│ ")
        );
    }

    let shown = &lines[lines.len() - CONTEXT_LINES..];
    let hidden = lines.len() - shown.len();

    format!(
        "┌─ output tail ({} bytes, {} lines) ────────\n│ ... ({} lines hidden)\n│ {}\n└────────────────────────────────────────",
        tail_len,
        lines.len(),
        hidden,
        shown.join("\n│ ")
    )
}

/// Format a stall error message.
fn format_stall_error(command: &str, stall_threshold: u32, tail: &str) -> String {
    let snippet = format_tail_snippet(tail);

    format!(
        "command '{command}' stalled: no new output and no recognised prompt \
         for {stall_threshold} polls\n\
         \n\
         {snippet}\n\
         \n\
         Tip: if the last line above is a question, add a rule for it to the \
         question table (or a no-op pattern if it is harmless chatter)."
    )
}

/// Format a command failure message.
fn format_command_failed(command: &str, exit_code: i32, error_lines: &[String]) -> String {
    if error_lines.is_empty() {
        return format!("command '{command}' failed with exit code {exit_code}");
    }

    format!(
        "command '{command}' failed with exit code {exit_code}; {} error line(s) in output:\n  {}",
        error_lines.len(),
        error_lines.join("\n  ")
    )
}

/// The main error type for qa-run operations.
#[derive(Debug, Error)]
pub enum QaError {
    /// Failed to spawn the command.
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] SpawnError),

    /// An I/O error occurred while driving the command.
    #[error("{context}: {source}")]
    Io {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The command made no progress for too many polls and was killed.
    #[error("{}", format_stall_error(command, *stall_threshold, tail))]
    Stalled {
        /// The command line that stalled.
        command: String,
        /// The threshold that was reached.
        stall_threshold: u32,
        /// The last bytes of the transcript, lossily decoded.
        tail: String,
    },

    /// A pattern derived from an exact question does not match the question.
    #[error("question '{question}' converted into '{pattern}' does not match itself")]
    QuestionSelfMatch {
        /// The literal question text.
        question: String,
        /// The derived regular expression.
        pattern: String,
    },

    /// A question, no-op or error pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A question rule was declared without any answer.
    #[error("no answers given for question '{question}'")]
    NoAnswers {
        /// The question text or pattern.
        question: String,
    },

    /// The command finished but its result counts as a failure.
    #[error("{}", format_command_failed(command, *exit_code, error_lines))]
    CommandFailed {
        /// The command line.
        command: String,
        /// The reported exit code.
        exit_code: i32,
        /// Output lines that matched the error pattern.
        error_lines: Vec<String>,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Errors related to process spawning.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The interpreter the command is handed to was not found.
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found.
        command: String,
    },

    /// Permission denied.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: String,
    },

    /// Working directory error.
    #[error("invalid working directory: {path}")]
    InvalidWorkingDir {
        /// The invalid working directory path.
        path: String,
    },

    /// General I/O error during spawn.
    #[error("I/O error during spawn: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for qa-run operations.
pub type Result<T> = std::result::Result<T, QaError>;

impl QaError {
    /// Create a stall error.
    pub fn stalled(command: impl Into<String>, stall_threshold: u32, tail: impl Into<String>) -> Self {
        Self::Stalled {
            command: command.into(),
            stall_threshold,
            tail: tail.into(),
        }
    }

    /// Create an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O result with context.
    pub fn with_io_context<T>(result: io::Result<T>, context: impl Into<String>) -> Result<T> {
        result.map_err(|e| Self::io_context(context, e))
    }

    /// Check if this is a stall error.
    #[must_use]
    pub const fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled { .. })
    }

    /// Get the transcript tail if this error carries one.
    #[must_use]
    pub fn tail(&self) -> Option<&str> {
        match self {
            Self::Stalled { tail, .. } => Some(tail),
            _ => None,
        }
    }
}

impl SpawnError {
    /// Create a command not found error.
    pub fn command_not_found(command: impl Into<String>) -> Self {
        Self::CommandNotFound {
            command: command.into(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    /// Create an invalid working directory error.
    pub fn invalid_working_dir(path: impl Into<String>) -> Self {
        Self::InvalidWorkingDir { path: path.into() }
    }

    /// Classify a process-level failure raised while starting `shell`.
    #[must_use]
    pub fn from_proc(err: qa_proc::ProcError, shell: &str) -> Self {
        let io_err = io::Error::from(err);
        match io_err.kind() {
            io::ErrorKind::NotFound => Self::command_not_found(shell),
            io::ErrorKind::PermissionDenied => Self::permission_denied(shell),
            _ => Self::Io(io_err),
        }
    }
}
