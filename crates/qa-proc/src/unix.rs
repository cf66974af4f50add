//! Unix platform implementation of the child process handle.
//!
//! This module provides:
//!
//! - Pipe allocation with `O_CLOEXEC` and `O_NONBLOCK` via `rustix`
//! - Spawning through an interpreter with stdout/stderr merged
//! - Process-group leadership so a forced kill reaches forked helpers
//!
//! # Example
//!
//! ```no_run
//! use qa_proc::unix::spawn_child;
//! use qa_proc::{ChildProcess, ProcessConfig};
//!
//! let mut child = spawn_child("echo hello", &ProcessConfig::default())?;
//! let _ = child.read_available()?;
//! # Ok::<(), qa_proc::ProcError>(())
//! ```

mod child;
mod pipe;

pub use child::{PipeChild, spawn_child};
pub use pipe::{OutputPipe, cloexec_pipe, set_nonblocking};
