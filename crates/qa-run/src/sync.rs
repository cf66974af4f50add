//! Blocking wrappers around the async entry points.
//!
//! Each call builds a private current-thread tokio runtime and drives one
//! command on it. Do not call these from inside an async context; use
//! [`crate::run_cmd_qa`] and [`crate::run_cmd`] there instead.

use tokio::runtime::{Builder, Runtime};

use crate::config::RunOptions;
use crate::error::{QaError, Result};
use crate::finalize::CommandResult;
use crate::rules::QaTable;

fn runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| QaError::io_context("creating tokio runtime", e))
}

/// Blocking version of [`crate::run_cmd_qa`].
///
/// ```no_run
/// use qa_run::{QaTable, RunOptions};
/// use qa_run::sync::run_cmd_qa_blocking;
///
/// let table = QaTable::new().exact("Proceed? [y/n]", "y");
/// let result = run_cmd_qa_blocking("./setup.sh", &table, &RunOptions::new())?;
/// println!("exit code {}", result.exit_code);
/// # Ok::<(), qa_run::QaError>(())
/// ```
pub fn run_cmd_qa_blocking(cmd: &str, table: &QaTable, options: &RunOptions) -> Result<CommandResult> {
    runtime()?.block_on(crate::run::run_cmd_qa(cmd, table, options))
}

/// Blocking version of [`crate::run_cmd`].
pub fn run_cmd_blocking(cmd: &str, input: Option<&str>, options: &RunOptions) -> Result<CommandResult> {
    runtime()?.block_on(crate::run::run_cmd(cmd, input, options))
}
