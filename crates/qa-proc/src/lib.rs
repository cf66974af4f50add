//! qa-proc: non-blocking child process handle
//!
//! This crate spawns a shell command line with its stdin piped and its
//! stdout/stderr merged into one non-blocking pipe, and exposes the child
//! through the [`ChildProcess`] trait: exit-status polling, reads that never
//! block, writes that report a closed pipe instead of failing, and forced
//! termination of the child's entire process group.
//!
//! There are no background threads: one owner drives the handle by calling
//! its methods repeatedly.
//!
//! # Quick Start
//!
//! ```no_run
//! use qa_proc::{ChildProcess, ProcessConfig, ReadOutcome};
//!
//! let mut child = qa_proc::spawn("read name; echo hi $name", &ProcessConfig::default())?;
//! child.write(b"world\n")?;
//!
//! let mut output = Vec::new();
//! loop {
//!     match child.read_available()? {
//!         ReadOutcome::Data(bytes) => output.extend(bytes),
//!         ReadOutcome::Empty => std::thread::sleep(std::time::Duration::from_millis(10)),
//!         ReadOutcome::Closed => break,
//!     }
//! }
//! # Ok::<(), qa_proc::ProcError>(())
//! ```

pub mod config;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod unix;

// Re-export primary types
pub use config::{DEFAULT_SHELL, ProcSignal, ProcessConfig, ProcessConfigBuilder};
pub use error::{ProcError, Result};
pub use traits::{ChildProcess, ExitStatus, ReadOutcome, WriteOutcome};

#[cfg(unix)]
pub use unix::PipeChild;

/// Spawn a command line with the given configuration.
///
/// # Errors
///
/// Returns an error if pipe creation or process spawning fails.
#[cfg(unix)]
pub fn spawn(cmd: &str, config: &ProcessConfig) -> Result<PipeChild> {
    unix::spawn_child(cmd, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ProcessConfig::default();
        assert_eq!(config.shell.to_str(), Some(DEFAULT_SHELL));
        assert!(config.working_directory.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn spawn_true() {
        let mut child = spawn("true", &ProcessConfig::default()).unwrap();
        let status = child.wait().unwrap();
        assert!(status.success());
    }
}
