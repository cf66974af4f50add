//! Unix child process management.
//!
//! This module spawns a command line under an interpreter with stdin piped
//! and stdout/stderr merged into a single non-blocking pipe. The child leads
//! its own process group so that forced termination reaches every helper it
//! forks.

use std::io::{self, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ChildStdin, Command, ExitStatus as StdExitStatus, Stdio};

use std::time::Duration;

use rustix::process::{Pid, Signal, kill_process, kill_process_group};

use super::pipe::{OutputPipe, cloexec_pipe, set_nonblocking};
use crate::config::{ProcSignal, ProcessConfig};
use crate::error::{ProcError, Result};
use crate::traits::{ChildProcess, ExitStatus, ReadOutcome, WriteOutcome};

/// Exit-status polls made after SIGKILL before giving up.
const REAP_ATTEMPTS: u32 = 100;

/// Pause between those polls.
const REAP_INTERVAL: Duration = Duration::from_millis(5);

/// Handle to a command spawned with piped, non-blocking I/O.
pub struct PipeChild {
    /// The underlying std child.
    child: Child,
    /// The process ID, which is also the process group ID.
    pid: u32,
    /// Non-blocking write end of the child's stdin.
    stdin: Option<ChildStdin>,
    /// Non-blocking read end of the merged stdout/stderr pipe.
    output: OutputPipe,
    /// Cached exit status once the child has been reaped.
    exit_status: Option<ExitStatus>,
}

impl std::fmt::Debug for PipeChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeChild")
            .field("pid", &self.pid)
            .field("stdin_open", &self.stdin.is_some())
            .field("output_open", &!self.output.is_closed())
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

impl PipeChild {
    /// Get the process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Check if the process has not been reaped yet.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.exit_status.is_none()
    }

    /// Get the cached exit status, if the child has been reaped.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    fn raw_pid(&self) -> Result<Pid> {
        Pid::from_raw(self.pid as i32).ok_or_else(|| {
            ProcError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))
        })
    }

    /// Send a signal to the child's whole process group.
    pub fn signal_group(&self, signal: ProcSignal) -> Result<()> {
        if self.exit_status.is_some() {
            return Err(ProcError::Reaped);
        }

        kill_process_group(self.raw_pid()?, to_rustix_signal(signal)?)
            .map_err(|e| ProcError::Signal(io::Error::from_raw_os_error(e.raw_os_error())))
    }

    /// Send a signal to the child process only.
    pub fn signal(&self, signal: ProcSignal) -> Result<()> {
        if self.exit_status.is_some() {
            return Err(ProcError::Reaped);
        }

        kill_process(self.raw_pid()?, to_rustix_signal(signal)?)
            .map_err(|e| ProcError::Signal(io::Error::from_raw_os_error(e.raw_os_error())))
    }

    /// Block until the child exits and cache its status.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }

        let status = convert_exit_status(self.child.wait().map_err(ProcError::Wait)?);
        self.exit_status = Some(status);
        Ok(status)
    }

    /// Try to get the exit status without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }

        match self.child.try_wait().map_err(ProcError::Wait)? {
            Some(status) => {
                let status = convert_exit_status(status);
                self.exit_status = Some(status);
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// Kill the process group, then the child itself, and reap it.
    ///
    /// Failures to signal (typically because the group is already gone) are
    /// logged and ignored. Reaping is bounded: a child that has not exited
    /// within `REAP_ATTEMPTS * REAP_INTERVAL` yields a `Wait` error, and
    /// dropping the handle tries again.
    pub fn kill(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }

        if let Err(e) = self.signal_group(ProcSignal::Kill) {
            tracing::debug!(pid = self.pid, error = %e, "killing process group failed");
        }
        if let Err(e) = self.signal(ProcSignal::Kill) {
            tracing::debug!(pid = self.pid, error = %e, "killing child process failed");
        }

        self.stdin = None;
        match self.reap_within(REAP_ATTEMPTS, REAP_INTERVAL)? {
            Some(status) => Ok(status),
            None => Err(ProcError::Wait(io::Error::new(
                io::ErrorKind::TimedOut,
                "child not reaped after SIGKILL",
            ))),
        }
    }

    /// Poll for exit up to `attempts` times, sleeping `interval` in between.
    fn reap_within(&mut self, attempts: u32, interval: Duration) -> Result<Option<ExitStatus>> {
        for attempt in 0..attempts {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if attempt + 1 < attempts {
                std::thread::sleep(interval);
            }
        }
        Ok(None)
    }
}

impl ChildProcess for PipeChild {
    fn pid(&self) -> u32 {
        Self::pid(self)
    }

    fn poll(&mut self) -> Result<Option<ExitStatus>> {
        self.try_wait()
    }

    fn read_available(&mut self) -> Result<ReadOutcome> {
        self.output.drain()
    }

    fn write(&mut self, data: &[u8]) -> Result<WriteOutcome> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(WriteOutcome::Closed);
        };
        if data.is_empty() {
            return Ok(WriteOutcome::Written(0));
        }

        match stdin.write(data) {
            Ok(n) => Ok(WriteOutcome::Written(n)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(WriteOutcome::Written(0))
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                self.stdin = None;
                Ok(WriteOutcome::Closed)
            }
            Err(e) => Err(ProcError::Io(e)),
        }
    }

    fn close_stdin(&mut self) {
        self.stdin = None;
    }

    fn terminate_forcefully(&mut self) -> Result<()> {
        let status = self.kill()?;
        tracing::debug!(pid = self.pid, %status, "child terminated forcefully");
        Ok(())
    }
}

impl Drop for PipeChild {
    fn drop(&mut self) {
        if self.exit_status.is_none() {
            if let Ok(Some(_)) = self.try_wait() {
                return;
            }
            if let Err(e) = self.kill() {
                tracing::debug!(pid = self.pid, error = %e, "failed to reap child on drop");
            }
        }
    }
}

fn to_rustix_signal(signal: ProcSignal) -> Result<Signal> {
    Signal::from_named_raw(signal.as_unix_signal()).ok_or_else(|| {
        ProcError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid signal"))
    })
}

/// Convert `std::process::ExitStatus` to our `ExitStatus`.
fn convert_exit_status(status: StdExitStatus) -> ExitStatus {
    if let Some(code) = status.code() {
        ExitStatus::Exited(code)
    } else if let Some(signal) = status.signal() {
        ExitStatus::Signaled(signal)
    } else {
        ExitStatus::Exited(-1)
    }
}

/// Spawn `cmd` through the configured interpreter (`<shell> -c <cmd>`).
///
/// stdin is piped, stdout and stderr share one pipe, both parent-side
/// descriptors are non-blocking, and the child leads a new process group.
pub fn spawn_child(cmd: &str, config: &ProcessConfig) -> Result<PipeChild> {
    let (reader, writer) = cloexec_pipe()?;
    let stderr_writer = writer.try_clone().map_err(ProcError::Pipe)?;

    let mut child = {
        let mut command = Command::new(&config.shell);
        command
            .arg("-c")
            .arg(cmd)
            .env_clear()
            .envs(config.effective_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr_writer))
            .process_group(0);

        if let Some(ref dir) = config.working_directory {
            command.current_dir(dir);
        }

        // Dropping `command` releases the parent's copies of the write end,
        // so EOF is observed once the child side closes.
        command.spawn().map_err(ProcError::Spawn)?
    };

    let pid = child.id();
    let stdin = child.stdin.take();
    if let Some(ref stdin) = stdin {
        set_nonblocking(stdin)?;
    }
    let output = OutputPipe::new(reader, config.read_chunk, config.max_read)?;

    tracing::debug!(pid, shell = %config.shell.display(), command = cmd, "spawned child");

    Ok(PipeChild {
        child,
        pid,
        stdin,
        output,
        exit_status: None,
    })
}
