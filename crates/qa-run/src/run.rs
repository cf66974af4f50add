//! Entry points that spawn a command and see it through to a result.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use qa_proc::{ChildProcess, PipeChild, ReadOutcome, WriteOutcome};

use crate::command_log::CommandLog;
use crate::config::RunOptions;
use crate::error::{QaError, Result, SpawnError};
use crate::finalize::{self, CommandResult, FinalizePolicy};
use crate::rules::{QaTable, RuleSet};
use crate::session::InteractionSession;

/// Longest sleep between polls of a non-interactive command.
const MAX_PLAIN_POLL: Duration = Duration::from_millis(10);

/// Run an interactive command, answering its prompts from `table`.
///
/// The command line is handed to the shell from the options. The run ends
/// when the command exits, or with [`QaError::Stalled`] once it has gone
/// `stall_threshold` polls without printing anything new or showing a
/// known prompt.
///
/// # Example
///
/// ```no_run
/// use qa_run::{QaTable, RunOptions, Strictness};
///
/// # async fn demo() -> qa_run::Result<()> {
/// let table = QaTable::new()
///     .exact("Install to /opt/foo? [y/n]", "y")
///     .standard(r"Enter licence key for (?P<product>\w+):", "KEY-$product");
/// let options = RunOptions::new().strictness(Strictness::Error);
///
/// let result = qa_run::run_cmd_qa("./install.sh", &table, &options).await?;
/// assert!(result.succeeded);
/// # Ok(())
/// # }
/// ```
pub async fn run_cmd_qa(cmd: &str, table: &QaTable, options: &RunOptions) -> Result<CommandResult> {
    options.config.validate()?;
    let rules = RuleSet::compile(table)?;
    let policy = FinalizePolicy::from_options(options)?;
    let started = Instant::now();

    let child = start(cmd, options)?;
    let mut session = InteractionSession::new(child, cmd, rules, &options.config);
    if let Some(log) = open_log(cmd, options)? {
        session = session.with_command_log(log);
    }

    let output = session.run().await?;
    let mut child = output.child;
    let mut log = output.command_log;
    let exit_code = output.exit_status.as_exit_code();

    let mut result = finalize::finalize(
        &mut child,
        cmd,
        output.transcript,
        exit_code,
        &policy,
        log.as_mut(),
    )?;
    result.answers_sent = output.answers_sent;
    result.elapsed = started.elapsed();
    log_finished(&result);
    Ok(result)
}

/// Run a command without answering prompts.
///
/// `input`, if any, is written to the command's stdin, which is then closed.
/// Output is collected until the command exits; there is no stall
/// detection, so a command that waits forever is waited on forever.
///
/// ```no_run
/// use qa_run::RunOptions;
///
/// # async fn demo() -> qa_run::Result<()> {
/// let result = qa_run::run_cmd("sort", Some("b\na\n"), &RunOptions::new()).await?;
/// assert_eq!(result.combined_output, "a\nb\n");
/// # Ok(())
/// # }
/// ```
pub async fn run_cmd(cmd: &str, input: Option<&str>, options: &RunOptions) -> Result<CommandResult> {
    options.config.validate()?;
    let policy = FinalizePolicy::from_options(options)?;
    let started = Instant::now();

    let mut child = start(cmd, options)?;
    let mut log = open_log(cmd, options)?;
    let pause = options.config.poll_interval.min(MAX_PLAIN_POLL);

    let mut pending: VecDeque<u8> = input.map(|s| s.bytes().collect()).unwrap_or_default();
    if pending.is_empty() {
        child.close_stdin();
    }

    let mut transcript = Vec::new();
    let status = loop {
        if let Some(status) = child
            .poll()
            .map_err(|e| QaError::io_context("polling command status", e.into()))?
        {
            break status;
        }

        if !pending.is_empty() && feed(&mut child, &mut pending)? {
            child.close_stdin();
        }

        let outcome = child
            .read_available()
            .map_err(|e| QaError::io_context("reading command output", e.into()))?;
        match outcome {
            ReadOutcome::Data(bytes) => {
                if let Some(log) = log.as_mut() {
                    log.append(&bytes)?;
                }
                transcript.extend_from_slice(&bytes);
            }
            ReadOutcome::Empty | ReadOutcome::Closed => tokio::time::sleep(pause).await,
        }
    };

    let mut result = finalize::finalize(
        &mut child,
        cmd,
        transcript,
        status.as_exit_code(),
        &policy,
        log.as_mut(),
    )?;
    result.elapsed = started.elapsed();
    log_finished(&result);
    Ok(result)
}

/// Write as much of `pending` as the child takes; returns true once all of
/// it is gone (written or dropped because stdin closed).
fn feed<P: ChildProcess>(child: &mut P, pending: &mut VecDeque<u8>) -> Result<bool> {
    while !pending.is_empty() {
        let (front, _) = pending.as_slices();
        let outcome = child
            .write(front)
            .map_err(|e| QaError::io_context("writing input to command", e.into()))?;
        match outcome {
            WriteOutcome::Written(0) => return Ok(false),
            WriteOutcome::Written(n) => {
                pending.drain(..n.min(pending.len()));
            }
            WriteOutcome::Closed => {
                tracing::debug!(dropped = pending.len(), "command closed its input early");
                pending.clear();
            }
        }
    }
    Ok(true)
}

/// Check the working directory and spawn the command.
fn start(cmd: &str, options: &RunOptions) -> Result<PipeChild> {
    let dir = options
        .working_dir
        .as_deref()
        .map(|p| p.display().to_string());
    tracing::info!(
        command = cmd,
        working_dir = dir.as_deref().unwrap_or("."),
        log_file = ?options.log_file,
        strictness = %options.config.strictness,
        "running command"
    );

    if let Some(ref path) = options.working_dir {
        if !path.is_dir() {
            let err = SpawnError::invalid_working_dir(path.display().to_string());
            tracing::error!(command = cmd, error = %err, "cannot start command");
            return Err(err.into());
        }
    }

    let shell = options.config.shell.display().to_string();
    qa_proc::spawn(cmd, &options.process_config()).map_err(|e| {
        let err = SpawnError::from_proc(e, &shell);
        tracing::error!(command = cmd, error = %err, "cannot start command");
        QaError::from(err)
    })
}

fn open_log(cmd: &str, options: &RunOptions) -> Result<Option<CommandLog>> {
    options
        .log_file
        .as_ref()
        .map(|path| CommandLog::create(path, cmd))
        .transpose()
}

fn log_finished(result: &CommandResult) {
    tracing::info!(
        command = %result.command,
        exit_code = result.exit_code,
        succeeded = result.succeeded,
        answers = result.answers_sent,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "command finished"
    );
}
