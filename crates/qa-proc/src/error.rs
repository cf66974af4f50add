//! Error types for the qa-proc crate.
//!
//! This module provides a unified error type [`ProcError`] that covers the
//! failure modes of spawning, polling and signalling a child process.

use std::io;

/// The error type for child process operations.
#[derive(Debug, thiserror::Error)]
pub enum ProcError {
    /// Failed to create the pipes connecting parent and child.
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] io::Error),

    /// Failed to spawn the child process.
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] io::Error),

    /// Failed to switch a descriptor to non-blocking mode.
    #[error("failed to set non-blocking mode: {0}")]
    NonBlocking(#[source] io::Error),

    /// An I/O error occurred while reading or writing the child's streams.
    #[error("process I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to send a signal to the child or its process group.
    #[error("failed to send signal: {0}")]
    Signal(#[source] io::Error),

    /// Failed to wait for the child process.
    #[error("failed to wait for child: {0}")]
    Wait(#[source] io::Error),

    /// The child has already been reaped.
    #[error("child process has already been reaped")]
    Reaped,

    /// Invalid configuration.
    #[error("invalid process configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// A specialized Result type for process operations.
pub type Result<T> = std::result::Result<T, ProcError>;

#[cfg(unix)]
impl From<rustix::io::Errno> for ProcError {
    fn from(errno: rustix::io::Errno) -> Self {
        Self::Io(io::Error::from_raw_os_error(errno.raw_os_error()))
    }
}

impl From<ProcError> for io::Error {
    fn from(err: ProcError) -> Self {
        match err {
            ProcError::Pipe(e)
            | ProcError::Spawn(e)
            | ProcError::NonBlocking(e)
            | ProcError::Io(e)
            | ProcError::Signal(e)
            | ProcError::Wait(e) => e,
            other => Self::other(other),
        }
    }
}

impl ProcError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check whether the underlying cause is a missing executable.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn(e) if e.kind() == io::ErrorKind::NotFound)
    }
}
