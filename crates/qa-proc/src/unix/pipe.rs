//! Non-blocking pipe plumbing.
//!
//! The child's stdout and stderr share the write end of one pipe; the parent
//! keeps the read end in non-blocking mode and drains it on demand.

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{AsFd, OwnedFd};

use rustix::fs::{OFlags, fcntl_getfl, fcntl_setfl};
use rustix::io::{FdFlags, fcntl_setfd};

use crate::error::{ProcError, Result};
use crate::traits::ReadOutcome;

fn errno_to_io(errno: rustix::io::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno.raw_os_error())
}

/// Create a pipe whose ends are not inherited across `exec`.
///
/// Returns `(reader, writer)`.
pub fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (reader, writer) = rustix::pipe::pipe().map_err(|e| ProcError::Pipe(errno_to_io(e)))?;
    fcntl_setfd(&reader, FdFlags::CLOEXEC).map_err(|e| ProcError::Pipe(errno_to_io(e)))?;
    fcntl_setfd(&writer, FdFlags::CLOEXEC).map_err(|e| ProcError::Pipe(errno_to_io(e)))?;
    Ok((reader, writer))
}

/// Add `O_NONBLOCK` to a descriptor's status flags.
pub fn set_nonblocking<Fd: AsFd>(fd: Fd) -> Result<()> {
    let flags = fcntl_getfl(&fd).map_err(|e| ProcError::NonBlocking(errno_to_io(e)))?;
    fcntl_setfl(&fd, flags | OFlags::NONBLOCK)
        .map_err(|e| ProcError::NonBlocking(errno_to_io(e)))
}

/// Read end of the merged output pipe.
#[derive(Debug)]
pub struct OutputPipe {
    file: Option<File>,
    chunk: usize,
    max_read: usize,
}

impl OutputPipe {
    /// Wrap a pipe read end, switching it to non-blocking mode.
    pub fn new(fd: OwnedFd, chunk: usize, max_read: usize) -> Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            file: Some(File::from(fd)),
            chunk: chunk.max(1),
            max_read: max_read.max(1),
        })
    }

    /// Check if the write side has been observed closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Drain whatever is buffered right now, without blocking.
    ///
    /// Once EOF has been seen the pipe is released and every later call
    /// returns [`ReadOutcome::Closed`]. Bytes read in the same call as EOF
    /// are returned first.
    pub fn drain(&mut self) -> Result<ReadOutcome> {
        let Some(file) = self.file.as_mut() else {
            return Ok(ReadOutcome::Closed);
        };

        let mut collected = Vec::new();
        let mut buf = vec![0u8; self.chunk];
        let mut eof = false;

        while collected.len() < self.max_read {
            match file.read(&mut buf) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ProcError::Io(e)),
            }
        }

        if eof {
            self.file = None;
        }

        Ok(match (collected.is_empty(), eof) {
            (false, _) => ReadOutcome::Data(collected),
            (true, true) => ReadOutcome::Closed,
            (true, false) => ReadOutcome::Empty,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn drain_empty_then_data_then_closed() {
        let (reader, writer) = cloexec_pipe().unwrap();
        let mut pipe = OutputPipe::new(reader, 4, 1024).unwrap();

        assert_eq!(pipe.drain().unwrap(), ReadOutcome::Empty);

        let mut writer = File::from(writer);
        writer.write_all(b"hello world").unwrap();
        assert_eq!(
            pipe.drain().unwrap(),
            ReadOutcome::Data(b"hello world".to_vec())
        );

        drop(writer);
        assert_eq!(pipe.drain().unwrap(), ReadOutcome::Closed);
        assert!(pipe.is_closed());
        assert_eq!(pipe.drain().unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn drain_respects_max_read() {
        let (reader, writer) = cloexec_pipe().unwrap();
        let mut pipe = OutputPipe::new(reader, 2, 4).unwrap();

        let mut writer = File::from(writer);
        writer.write_all(b"abcdefgh").unwrap();

        assert_eq!(pipe.drain().unwrap(), ReadOutcome::Data(b"abcd".to_vec()));
        assert_eq!(pipe.drain().unwrap(), ReadOutcome::Data(b"efgh".to_vec()));
        assert_eq!(pipe.drain().unwrap(), ReadOutcome::Empty);
    }

    #[test]
    fn data_before_eof_is_returned() {
        let (reader, writer) = cloexec_pipe().unwrap();
        let mut pipe = OutputPipe::new(reader, 64, 1024).unwrap();

        let mut writer = File::from(writer);
        writer.write_all(b"tail").unwrap();
        drop(writer);

        assert_eq!(pipe.drain().unwrap(), ReadOutcome::Data(b"tail".to_vec()));
        assert_eq!(pipe.drain().unwrap(), ReadOutcome::Closed);
    }

    proptest::proptest! {
        #[test]
        fn drain_returns_everything_written(
            data in proptest::collection::vec(proptest::num::u8::ANY, 1..4096),
            chunk in 1usize..512,
        ) {
            let (reader, writer) = cloexec_pipe().unwrap();
            let mut pipe = OutputPipe::new(reader, chunk, usize::MAX).unwrap();

            let mut writer = File::from(writer);
            writer.write_all(&data).unwrap();
            drop(writer);

            let mut collected = Vec::new();
            loop {
                match pipe.drain().unwrap() {
                    ReadOutcome::Data(bytes) => collected.extend(bytes),
                    ReadOutcome::Empty => {}
                    ReadOutcome::Closed => break,
                }
            }
            proptest::prop_assert_eq!(collected, data);
        }
    }
}
