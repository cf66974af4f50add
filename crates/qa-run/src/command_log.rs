//! Per-command output log.
//!
//! The file starts with the command line and a blank line, followed by
//! every byte the command printed, written as it arrives.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{QaError, Result};

/// Append-only sink for one command's output.
#[derive(Debug)]
pub struct CommandLog {
    file: File,
    path: PathBuf,
}

impl CommandLog {
    /// Create (or truncate) the log file and write the command header.
    pub fn create(path: impl AsRef<Path>, command: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = QaError::with_io_context(
            File::create(&path),
            format!("opening command log {}", path.display()),
        )?;
        QaError::with_io_context(
            write!(file, "{command}\n\n"),
            format!("writing command log {}", path.display()),
        )?;
        tracing::debug!(command, path = %path.display(), "command output will be logged");
        Ok(Self { file, path })
    }

    /// Append output bytes.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        QaError::with_io_context(
            self.file.write_all(bytes),
            format!("writing command log {}", self.path.display()),
        )
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd.log");

        let mut log = CommandLog::create(&path, "./configure --prefix=/opt").unwrap();
        log.append(b"checking for gcc... gcc\n").unwrap();
        log.append(b"done\n").unwrap();
        assert_eq!(log.path(), path.as_path());
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "./configure --prefix=/opt\n\nchecking for gcc... gcc\ndone\n"
        );
    }

    #[test]
    fn unwritable_location_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandLog::create(dir.path().join("missing/dir/cmd.log"), "true").unwrap_err();
        assert!(matches!(err, QaError::Io { .. }));
    }
}
