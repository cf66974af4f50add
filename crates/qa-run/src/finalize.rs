//! Judging a finished command.
//!
//! After the child has exited, the remaining output is drained, the
//! transcript is scanned line by line for error messages, and exit code,
//! error lines and [`Strictness`] are combined into a [`CommandResult`].

use std::time::Duration;

use qa_proc::{ChildProcess, ReadOutcome};
use regex::{Regex, RegexBuilder};

use crate::command_log::CommandLog;
use crate::config::{ErrorPattern, RunOptions, Strictness};
use crate::error::{QaError, Result};

/// Default error pattern: `error`, `failed` or `segmentation fault` as a
/// word of its own.
///
/// The word must not follow a word character, `(`, `,` or `-`, and must not
/// be followed by a word character, `(`, `,`, `-` or a `.` that continues
/// into a word. So `make: *** Error 2` and `Build failed.` match while
/// `-Werror`, `no_errors` and `error.h` do not.
pub const DEFAULT_ERROR_PATTERN: &str =
    r"(?:^|[^(,\-\w])(error|segmentation fault|failed)(?:$|[^(,\-\w.]|\.(?:$|\W))";

/// Compile an error pattern the way the scanners use it (case-insensitive).
pub fn compile_error_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| QaError::invalid_pattern(pattern, e))
}

impl ErrorPattern {
    /// Compile the chosen pattern; `None` when scanning is disabled.
    pub fn compile(&self) -> Result<Option<Regex>> {
        match self {
            Self::Default => compile_error_pattern(DEFAULT_ERROR_PATTERN).map(Some),
            Self::Custom(pattern) => compile_error_pattern(pattern).map(Some),
            Self::Disabled => Ok(None),
        }
    }
}

/// Lines of `text` that match `regex`, in order.
#[must_use]
pub fn scan_errors(text: &str, regex: &Regex) -> Vec<String> {
    text.split('\n')
        .filter(|line| regex.is_match(line))
        .map(ToString::to_string)
        .collect()
}

/// A pattern tagged with what a matching line means.
#[derive(Debug, Clone)]
pub struct ErrorRule {
    regex: Regex,
    action: Strictness,
}

impl ErrorRule {
    /// Compile a rule; matching is case-insensitive.
    pub fn new(pattern: &str, action: Strictness) -> Result<Self> {
        Ok(Self {
            regex: compile_error_pattern(pattern)?,
            action,
        })
    }

    /// What a matching line is reported as.
    #[must_use]
    pub const fn action(&self) -> Strictness {
        self.action
    }
}

/// Sort the lines of `text` into warnings and errors.
///
/// For each line the first matching rule decides: `Ignore` drops the line,
/// `Warn` and `Error` put it in the respective list. Both lists are free of
/// duplicates and keep first-seen order.
///
/// ```
/// use qa_run::config::Strictness;
/// use qa_run::finalize::{ErrorRule, extract_errors};
///
/// let rules = [
///     ErrorRule::new("deprecated", Strictness::Ignore)?,
///     ErrorRule::new("warning", Strictness::Warn)?,
///     ErrorRule::new("error", Strictness::Error)?,
/// ];
/// let text = "warning: x\nerror: y\nwarning: deprecated\nerror: y\n";
/// let (warnings, errors) = extract_errors(text, &rules);
/// assert_eq!(warnings, ["warning: x"]);
/// assert_eq!(errors, ["error: y"]);
/// # Ok::<(), qa_run::QaError>(())
/// ```
#[must_use]
pub fn extract_errors(text: &str, rules: &[ErrorRule]) -> (Vec<String>, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for line in text.split('\n') {
        let Some(rule) = rules.iter().find(|r| r.regex.is_match(line)) else {
            continue;
        };
        let list = match rule.action {
            Strictness::Ignore => continue,
            Strictness::Warn => &mut warnings,
            Strictness::Error => &mut errors,
        };
        if !list.iter().any(|seen| seen == line) {
            list.push(line.to_string());
        }
    }

    (warnings, errors)
}

/// How a finished command is judged.
#[derive(Debug, Clone)]
pub struct FinalizePolicy {
    /// Strictness level.
    pub strictness: Strictness,
    /// Compiled error pattern; `None` disables scanning.
    pub error_regex: Option<Regex>,
}

impl FinalizePolicy {
    /// Build the policy described by run options.
    pub fn from_options(options: &RunOptions) -> Result<Self> {
        Ok(Self {
            strictness: options.config.strictness,
            error_regex: options.error_pattern.compile()?,
        })
    }
}

/// The outcome of a completed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The command line.
    pub command: String,
    /// stdout and stderr, interleaved as the command produced them.
    pub combined_output: String,
    /// Exit code; `128 + n` when the command died from signal `n`.
    pub exit_code: i32,
    /// Whether the run counts as successful under its strictness.
    pub succeeded: bool,
    /// Output lines that matched the error pattern.
    pub error_lines: Vec<String>,
    /// Number of answers sent to the command.
    pub answers_sent: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl CommandResult {
    /// Turn a failed result into [`QaError::CommandFailed`].
    pub fn ensure_success(self) -> Result<Self> {
        if self.succeeded {
            Ok(self)
        } else {
            Err(QaError::CommandFailed {
                command: self.command,
                exit_code: self.exit_code,
                error_lines: self.error_lines,
            })
        }
    }
}

/// Read whatever the child left in its output pipe.
///
/// Stops at the first empty or closed read. A read error ends the drain
/// without failing it; the output collected so far is kept.
pub fn drain_remaining<P: ChildProcess>(
    child: &mut P,
    transcript: &mut Vec<u8>,
    mut log: Option<&mut CommandLog>,
) -> Result<()> {
    loop {
        match child.read_available() {
            Ok(ReadOutcome::Data(bytes)) => {
                if let Some(log) = log.as_deref_mut() {
                    log.append(&bytes)?;
                }
                transcript.extend_from_slice(&bytes);
            }
            Ok(ReadOutcome::Empty | ReadOutcome::Closed) => return Ok(()),
            Err(e) => {
                tracing::debug!(pid = child.pid(), error = %e, "reading remaining output failed");
                return Ok(());
            }
        }
    }
}

/// Drain trailing output, then judge the command.
pub fn finalize<P: ChildProcess>(
    child: &mut P,
    command: &str,
    mut transcript: Vec<u8>,
    exit_code: i32,
    policy: &FinalizePolicy,
    log: Option<&mut CommandLog>,
) -> Result<CommandResult> {
    drain_remaining(child, &mut transcript, log)?;
    let output = String::from_utf8_lossy(&transcript).into_owned();
    Ok(judge(command, output, exit_code, policy))
}

/// Combine exit code, error lines and strictness into a result.
#[must_use]
pub fn judge(command: &str, output: String, exit_code: i32, policy: &FinalizePolicy) -> CommandResult {
    let strictness = policy.strictness;
    let mut succeeded = true;

    if exit_code == 0 {
        tracing::debug!(command, exit_code, output = %output, "command exited");
    } else {
        match strictness {
            Strictness::Ignore => {
                tracing::debug!(command, exit_code, "command exited with non-zero code (ignored)");
            }
            Strictness::Warn => {
                tracing::warn!(command, exit_code, output = %output, "command exited with non-zero code");
            }
            Strictness::Error => {
                tracing::error!(command, exit_code, output = %output, "command exited with non-zero code");
                succeeded = false;
            }
        }
    }

    let error_lines = policy
        .error_regex
        .as_ref()
        .map_or_else(Vec::new, |regex| scan_errors(&output, regex));

    if !error_lines.is_empty() {
        let found = error_lines.len();
        if strictness == Strictness::Error {
            tracing::error!(command, found, lines = ?error_lines, "errors found in command output");
            succeeded = false;
        } else {
            tracing::warn!(command, found, lines = ?error_lines, "potential errors found in command output");
        }
    }

    CommandResult {
        command: command.to_string(),
        combined_output: output,
        exit_code,
        succeeded,
        error_lines,
        answers_sent: 0,
        elapsed: Duration::ZERO,
    }
}
