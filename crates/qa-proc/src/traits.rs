//! Core traits for the child process abstraction.
//!
//! This module defines the surface the interaction loop drives:
//!
//! - [`ChildProcess`]: non-blocking control of a spawned command.
//! - [`ReadOutcome`] / [`WriteOutcome`]: results of non-blocking I/O.
//! - [`ExitStatus`]: how the child terminated.

use std::fmt;

use crate::error::Result;

/// Result of a non-blocking read from the child's merged output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes that were buffered at the time of the call (never empty).
    Data(Vec<u8>),
    /// Nothing is buffered right now; the stream is still open.
    Empty,
    /// The child closed the stream for good.
    Closed,
}

impl ReadOutcome {
    /// Get the data, if any was read.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(bytes) => Some(bytes),
            Self::Empty | Self::Closed => None,
        }
    }

    /// Check whether the stream is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Result of a non-blocking write to the child's stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// This many bytes were accepted; 0 means the pipe is full right now.
    Written(usize),
    /// The child exited or closed its stdin.
    Closed,
}

/// Non-blocking handle to a spawned command.
///
/// Every method returns immediately. A single owner drives the handle from
/// one loop, so implementations need no internal synchronisation.
pub trait ChildProcess {
    /// Get the process ID of the child (also its process group ID).
    fn pid(&self) -> u32;

    /// Check for an exit status without blocking.
    ///
    /// Returns `None` while the process is alive.
    fn poll(&mut self) -> Result<Option<ExitStatus>>;

    /// Return whatever output is buffered right now.
    fn read_available(&mut self) -> Result<ReadOutcome>;

    /// Write as much of `data` as the stdin pipe accepts right now.
    fn write(&mut self, data: &[u8]) -> Result<WriteOutcome>;

    /// Close the child's stdin so it observes EOF.
    fn close_stdin(&mut self);

    /// Kill the child's entire process group and reap the child.
    fn terminate_forcefully(&mut self) -> Result<()>;
}

/// Exit status of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The process exited normally with the given exit code.
    Exited(i32),

    /// The process was terminated by a signal.
    Signaled(i32),
}

impl ExitStatus {
    /// Check if the process exited successfully (exit code 0).
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Get the exit code, if the process exited normally.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Signaled(_) => None,
        }
    }

    /// Get the signal number that terminated the process.
    #[must_use]
    pub const fn signal(&self) -> Option<i32> {
        match self {
            Self::Signaled(sig) => Some(*sig),
            Self::Exited(_) => None,
        }
    }

    /// Collapse the status into a single shell-style exit code.
    ///
    /// Signal deaths map to `128 + signal`.
    #[must_use]
    pub const fn as_exit_code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(sig) => 128 + *sig,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "terminated by signal {sig}"),
        }
    }
}
