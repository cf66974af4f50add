//! Scripted child process for unit testing.
//!
//! Every call to `read_available` consumes one scripted step. Reactions
//! queue more output (or an exit) when the bytes written so far contain a
//! trigger, which is how a prompt gets "answered".

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use qa_proc::{ChildProcess, ExitStatus, ProcError, ReadOutcome, WriteOutcome};

/// Signal number reported after a forced termination.
const SIGKILL: i32 = 9;

#[derive(Debug)]
struct Reaction {
    trigger: Vec<u8>,
    output: Vec<u8>,
    exit: Option<ExitStatus>,
    fired: bool,
}

/// Shared state between the process and its inspection handle.
#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<Option<Vec<u8>>>,
    reactions: Vec<Reaction>,
    exit_when_drained: Option<ExitStatus>,
    exit_status: Option<ExitStatus>,
    stdout_closed: bool,
    stdin_closed: bool,
    write_limit: Option<usize>,
    fail_read_at: Option<usize>,
    fail_write_at: Option<usize>,
    written: Vec<u8>,
    reads: usize,
    writes: usize,
    polls: usize,
    kills: usize,
}

impl ScriptState {
    fn react(&mut self) {
        let written = &self.written;
        let mut queued = Vec::new();
        for reaction in self.reactions.iter_mut().filter(|r| !r.fired) {
            if contains(written, &reaction.trigger) {
                reaction.fired = true;
                queued.push((reaction.output.clone(), reaction.exit));
            }
        }
        for (output, exit) in queued {
            if !output.is_empty() {
                self.steps.push_back(Some(output));
            }
            if exit.is_some() {
                self.exit_when_drained = exit;
            }
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// A [`ChildProcess`] driven by a script instead of a real program.
///
/// # Example
///
/// ```ignore
/// use qa_run::test_utils::ScriptedProcess;
///
/// let process = ScriptedProcess::new()
///     .output("Continue? [y/n] ")
///     .on_input_exit("y\n", "ok\n", 0);
/// let handle = process.handle();
/// assert_eq!(handle.written(), b"");
/// ```
#[derive(Debug)]
pub struct ScriptedProcess {
    state: Arc<Mutex<ScriptState>>,
}

impl Default for ScriptedProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProcess {
    /// Create a process with an empty script that never exits on its own.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one read that returns `bytes`.
    #[must_use]
    pub fn output(self, bytes: impl AsRef<[u8]>) -> Self {
        self.lock().steps.push_back(Some(bytes.as_ref().to_vec()));
        self
    }

    /// Queue `reads` reads that find nothing.
    #[must_use]
    pub fn silence(self, reads: usize) -> Self {
        self.lock().steps.extend((0..reads).map(|_| None));
        self
    }

    /// Exit with `code` once every queued read has been consumed.
    #[must_use]
    pub fn exit_after_script(self, code: i32) -> Self {
        self.lock().exit_when_drained = Some(ExitStatus::Exited(code));
        self
    }

    /// When the input so far contains `trigger`, queue `output`.
    #[must_use]
    pub fn on_input(self, trigger: impl AsRef<[u8]>, output: impl AsRef<[u8]>) -> Self {
        self.lock().reactions.push(Reaction {
            trigger: trigger.as_ref().to_vec(),
            output: output.as_ref().to_vec(),
            exit: None,
            fired: false,
        });
        self
    }

    /// When the input so far contains `trigger`, queue `output` and then exit.
    #[must_use]
    pub fn on_input_exit(
        self,
        trigger: impl AsRef<[u8]>,
        output: impl AsRef<[u8]>,
        code: i32,
    ) -> Self {
        self.lock().reactions.push(Reaction {
            trigger: trigger.as_ref().to_vec(),
            output: output.as_ref().to_vec(),
            exit: Some(ExitStatus::Exited(code)),
            fired: false,
        });
        self
    }

    /// Accept at most `bytes` per write call.
    #[must_use]
    pub fn write_limit(self, bytes: usize) -> Self {
        self.lock().write_limit = Some(bytes);
        self
    }

    /// Make the `call`th `read_available` (counting from 1) fail with an I/O error.
    #[must_use]
    pub fn fail_read_at(self, call: usize) -> Self {
        self.lock().fail_read_at = Some(call);
        self
    }

    /// Make the `call`th `write` (counting from 1) fail with an I/O error.
    #[must_use]
    pub fn fail_write_at(self, call: usize) -> Self {
        self.lock().fail_write_at = Some(call);
        self
    }

    /// Get a handle for inspecting the process after it has been moved.
    #[must_use]
    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl ChildProcess for ScriptedProcess {
    fn pid(&self) -> u32 {
        4242
    }

    fn poll(&mut self) -> qa_proc::Result<Option<ExitStatus>> {
        let mut state = self.lock();
        state.polls += 1;
        if state.exit_status.is_none() && state.steps.is_empty() {
            state.exit_status = state.exit_when_drained;
        }
        Ok(state.exit_status)
    }

    fn read_available(&mut self) -> qa_proc::Result<ReadOutcome> {
        let mut state = self.lock();
        state.reads += 1;
        if state.fail_read_at == Some(state.reads) {
            return Err(ProcError::Io(io::Error::other("scripted read failure")));
        }
        if state.stdout_closed {
            return Ok(ReadOutcome::Closed);
        }
        Ok(match state.steps.pop_front() {
            Some(Some(bytes)) => ReadOutcome::Data(bytes),
            Some(None) => ReadOutcome::Empty,
            None if state.exit_status.is_some() => {
                state.stdout_closed = true;
                ReadOutcome::Closed
            }
            None => ReadOutcome::Empty,
        })
    }

    fn write(&mut self, data: &[u8]) -> qa_proc::Result<WriteOutcome> {
        let mut state = self.lock();
        state.writes += 1;
        if state.fail_write_at == Some(state.writes) {
            return Err(ProcError::Io(io::Error::other("scripted write failure")));
        }
        if state.stdin_closed || state.exit_status.is_some() {
            return Ok(WriteOutcome::Closed);
        }
        let accepted = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        state.written.extend_from_slice(&data[..accepted]);
        state.react();
        Ok(WriteOutcome::Written(accepted))
    }

    fn close_stdin(&mut self) {
        self.lock().stdin_closed = true;
    }

    fn terminate_forcefully(&mut self) -> qa_proc::Result<()> {
        let mut state = self.lock();
        state.kills += 1;
        state.steps.clear();
        state.stdout_closed = true;
        state.exit_status = Some(ExitStatus::Signaled(SIGKILL));
        Ok(())
    }
}

/// Read-only view of a [`ScriptedProcess`] that outlives it.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything written to the process's stdin.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Everything written, as a lossy string.
    #[must_use]
    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.lock().written).into_owned()
    }

    /// Number of `read_available` calls so far.
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.lock().reads
    }

    /// Number of `write` calls so far.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.lock().writes
    }

    /// Number of `poll` calls so far.
    #[must_use]
    pub fn poll_calls(&self) -> usize {
        self.lock().polls
    }

    /// Number of forced terminations.
    #[must_use]
    pub fn kill_count(&self) -> usize {
        self.lock().kills
    }

    /// Check whether stdin was closed by the driver.
    #[must_use]
    pub fn stdin_closed(&self) -> bool {
        self.lock().stdin_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_is_consumed_in_order() {
        let mut process = ScriptedProcess::new()
            .output("a")
            .silence(1)
            .output("b")
            .exit_after_script(3);

        assert_eq!(process.poll().unwrap(), None);
        assert_eq!(process.read_available().unwrap(), ReadOutcome::Data(b"a".to_vec()));
        assert_eq!(process.read_available().unwrap(), ReadOutcome::Empty);
        assert_eq!(process.read_available().unwrap(), ReadOutcome::Data(b"b".to_vec()));
        assert_eq!(process.poll().unwrap(), Some(ExitStatus::Exited(3)));
        assert_eq!(process.read_available().unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn input_triggers_reaction() {
        let mut process = ScriptedProcess::new().on_input_exit("yes\n", "bye\n", 0);
        let handle = process.handle();

        assert_eq!(process.read_available().unwrap(), ReadOutcome::Empty);
        assert_eq!(process.write(b"ye").unwrap(), WriteOutcome::Written(2));
        assert_eq!(process.poll().unwrap(), None);
        assert_eq!(process.write(b"s\n").unwrap(), WriteOutcome::Written(2));
        assert_eq!(process.read_available().unwrap(), ReadOutcome::Data(b"bye\n".to_vec()));
        assert_eq!(process.poll().unwrap(), Some(ExitStatus::Exited(0)));
        assert_eq!(handle.written_str(), "yes\n");
    }

    #[test]
    fn injected_failures_hit_the_chosen_call() {
        let mut process = ScriptedProcess::new()
            .output("a")
            .output("b")
            .fail_read_at(2)
            .fail_write_at(1);

        assert_eq!(process.read_available().unwrap(), ReadOutcome::Data(b"a".to_vec()));
        assert!(matches!(process.read_available(), Err(ProcError::Io(_))));
        assert_eq!(process.read_available().unwrap(), ReadOutcome::Data(b"b".to_vec()));
        assert!(matches!(process.write(b"x"), Err(ProcError::Io(_))));
        assert_eq!(process.write(b"x").unwrap(), WriteOutcome::Written(1));
    }

    #[test]
    fn write_limit_and_kill() {
        let mut process = ScriptedProcess::new().write_limit(2).output("never read");
        let handle = process.handle();

        assert_eq!(process.write(b"abcdef").unwrap(), WriteOutcome::Written(2));
        process.terminate_forcefully().unwrap();
        assert_eq!(process.poll().unwrap(), Some(ExitStatus::Signaled(9)));
        assert_eq!(process.read_available().unwrap(), ReadOutcome::Closed);
        assert_eq!(process.write(b"x").unwrap(), WriteOutcome::Closed);
        assert_eq!(handle.kill_count(), 1);
    }
}
