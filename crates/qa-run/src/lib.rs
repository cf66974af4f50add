//! qa-run: Interactive command automation
//!
//! This crate runs commands that ask questions (installers, `configure`
//! scripts, license prompts) and answers them from a question/answer table,
//! without ever blocking on a command that has stopped talking.
//!
//! # Features
//!
//! - **Exact questions** matched literally, tolerant of reflowed whitespace
//! - **Standard questions** as regular expressions, with `$name` expansion
//!   of named groups in the answer
//! - **No-op patterns** for known chatter that keeps the run alive
//! - **Stall detection**: a command that prints nothing new and shows no
//!   known prompt for `stall_threshold` polls has its process group killed
//! - **Strictness levels** deciding whether a non-zero exit or an error line
//!   in the output fails the run
//! - **Blocking wrappers** in [`sync`] for synchronous callers
//!
//! # Example
//!
//! ```no_run
//! use qa_run::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let table = QaTable::new()
//!         .exact("Install to /opt/foo? [y/n]", "y")
//!         .standard(r"Licence key for (?P<product>\w+):", "KEY-$product")
//!         .no_qa(r"Unpacking \S+\.\.\.");
//!     let options = RunOptions::new().strictness(Strictness::Error);
//!
//!     let result = run_cmd_qa("./install.sh", &table, &options).await?;
//!     println!("answered {} questions", result.answers_sent);
//!     Ok(())
//! }
//! ```

// Lets the table macros refer to `::qa_run` from inside this crate's tests.
extern crate self as qa_run;

// Re-export macros
pub use qa_run_macros::{qa_table, std_qa_table};

pub mod command_log;
pub mod config;
pub mod error;
pub mod finalize;
pub mod prelude;
pub mod rules;
pub mod run;
pub mod session;
pub mod sync;

/// Test doubles for the process handle.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use command_log::CommandLog;
pub use config::{EnvConfig, ErrorPattern, FileConfig, QaConfig, RunOptions, Strictness};
pub use error::{QaError, Result, SpawnError};
pub use finalize::{CommandResult, DEFAULT_ERROR_PATTERN, ErrorRule, FinalizePolicy, extract_errors};
pub use rules::{QaEntry, QaTable, RuleKind, RuleSet};
pub use run::{run_cmd, run_cmd_qa};
pub use session::{InteractionSession, Iteration, SessionOutput, SessionState};

// The process handle types callers need to drive a session themselves.
pub use qa_proc::{ChildProcess, ExitStatus, ReadOutcome, WriteOutcome};

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::{ScriptHandle, ScriptedProcess};
