//! The interaction loop.
//!
//! An [`InteractionSession`] owns one child and its transcript. Each
//! iteration polls for exit, flushes any input the child has not accepted
//! yet, reads whatever output is available and then decides:
//!
//! 1. new output and a question rule matches the end of the transcript:
//!    send the answer
//! 2. the transcript grew: progress
//! 3. a no-op pattern matches: known chatter
//! 4. otherwise the stall counter goes up; at the threshold the child's
//!    process group is killed
//!
//! Any of 1-3 resets the stall counter. Between iterations the loop sleeps
//! for the poll interval; that sleep is its only suspension point.

use std::collections::VecDeque;
use std::time::Duration;

use qa_proc::{ChildProcess, ExitStatus, ReadOutcome, WriteOutcome};

use crate::command_log::CommandLog;
use crate::config::QaConfig;
use crate::error::{QaError, Result};
use crate::rules::{RuleKind, RuleSet};

/// Bytes of transcript quoted in debug events.
const LOG_SNIPPET_LEN: usize = 50;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The child is alive and being driven.
    Running,
    /// The child exited on its own.
    Exited(ExitStatus),
    /// The child was killed after too many unproductive iterations.
    TerminatedByStall,
}

impl SessionState {
    /// Check whether the session is finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// What one iteration of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// An exact rule matched and its answer was sent.
    MatchedExact {
        /// Index of the rule in [`RuleSet::rules`].
        rule: usize,
    },
    /// A standard rule matched and its answer was sent.
    MatchedStandard {
        /// Index of the rule in [`RuleSet::rules`].
        rule: usize,
    },
    /// No rule matched but the child printed something.
    Progress,
    /// Nothing new, but the transcript ends in known chatter.
    MatchedNoOp,
    /// Nothing happened; the stall counter went up.
    NoMatch,
    /// The child has exited.
    Exited(ExitStatus),
    /// The child was killed for stalling.
    TerminatedByStall,
}

/// What a session hands over once the child has exited.
#[derive(Debug)]
pub struct SessionOutput<P> {
    /// The child, reaped but with its output pipe possibly still holding data.
    pub child: P,
    /// Everything read so far.
    pub transcript: Vec<u8>,
    /// How the child ended.
    pub exit_status: ExitStatus,
    /// Number of answers sent.
    pub answers_sent: usize,
    /// The command log, if one was attached.
    pub command_log: Option<CommandLog>,
}

/// Drives one child by answering its prompts.
#[derive(Debug)]
pub struct InteractionSession<P: ChildProcess> {
    child: P,
    command: String,
    rules: RuleSet,
    transcript: Vec<u8>,
    previous_len: usize,
    stall_count: u32,
    stall_threshold: u32,
    poll_interval: Duration,
    tail_len: usize,
    pending: VecDeque<u8>,
    cursors: Vec<usize>,
    answers_sent: usize,
    command_log: Option<CommandLog>,
    state: SessionState,
}

impl<P: ChildProcess> InteractionSession<P> {
    /// Create a session for an already spawned child.
    pub fn new(child: P, command: impl Into<String>, rules: RuleSet, config: &QaConfig) -> Self {
        let cursors = vec![0; rules.len()];
        Self {
            child,
            command: command.into(),
            rules,
            transcript: Vec::new(),
            previous_len: 0,
            stall_count: 0,
            stall_threshold: config.stall_threshold.max(1),
            poll_interval: config.poll_interval,
            tail_len: config.tail_len,
            pending: VecDeque::new(),
            cursors,
            answers_sent: 0,
            command_log: None,
            state: SessionState::Running,
        }
    }

    /// Copy all output to a command log.
    #[must_use]
    pub fn with_command_log(mut self, log: CommandLog) -> Self {
        self.command_log = Some(log);
        self
    }

    /// The command line being driven.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Everything the child has printed so far.
    #[must_use]
    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    /// Current number of consecutive unproductive iterations.
    #[must_use]
    pub const fn stall_count(&self) -> u32 {
        self.stall_count
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Number of answers sent so far.
    ///
    /// An answer still waiting in the pending queue counts; one dropped
    /// because the child closed its input does not.
    #[must_use]
    pub const fn answers_sent(&self) -> usize {
        self.answers_sent
    }

    /// Bytes of input the child has not accepted yet.
    #[must_use]
    pub fn pending_input(&self) -> usize {
        self.pending.len()
    }

    /// The last bytes of the transcript, lossily decoded.
    #[must_use]
    pub fn tail(&self) -> String {
        tail_of(&self.transcript, self.tail_len)
    }

    /// Run one iteration without sleeping.
    ///
    /// Once the session is terminal this returns the terminal outcome again
    /// without touching the child.
    pub fn step(&mut self) -> Result<Iteration> {
        match self.state {
            SessionState::Exited(status) => return Ok(Iteration::Exited(status)),
            SessionState::TerminatedByStall => return Ok(Iteration::TerminatedByStall),
            SessionState::Running => {}
        }

        let polled = self
            .child
            .poll()
            .map_err(|e| QaError::io_context("polling command status", e.into()))?;
        if let Some(status) = polled {
            tracing::debug!(command = %self.command, %status, "command exited");
            self.state = SessionState::Exited(status);
            return Ok(Iteration::Exited(status));
        }

        self.flush_pending()?;
        let new_output = self.read_output()?;
        let grew = self.transcript.len() > self.previous_len;
        self.previous_len = self.transcript.len();

        if new_output {
            if let Some(iteration) = self.answer_prompt()? {
                self.stall_count = 0;
                return Ok(iteration);
            }
        }

        if grew {
            self.stall_count = 0;
            return Ok(Iteration::Progress);
        }

        if let Some(pattern) = self.rules.find_no_qa(&self.transcript) {
            tracing::debug!(
                command = %self.command,
                pattern = pattern.source(),
                out = %tail_of(&self.transcript, LOG_SNIPPET_LEN),
                "no-op pattern matched"
            );
            self.stall_count = 0;
            return Ok(Iteration::MatchedNoOp);
        }

        self.stall_count += 1;
        tracing::trace!(command = %self.command, stall_count = self.stall_count, "no progress");
        if self.stall_count >= self.stall_threshold {
            self.terminate_for_stall();
            return Ok(Iteration::TerminatedByStall);
        }
        Ok(Iteration::NoMatch)
    }

    /// Drive the child until it exits.
    ///
    /// Fails with [`QaError::Stalled`] if the stall threshold is reached.
    pub async fn run(mut self) -> Result<SessionOutput<P>> {
        loop {
            match self.step()? {
                Iteration::Exited(status) => return Ok(self.into_output(status)),
                Iteration::TerminatedByStall => {
                    return Err(QaError::stalled(
                        self.command.clone(),
                        self.stall_threshold,
                        self.tail(),
                    ));
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    fn into_output(self, exit_status: ExitStatus) -> SessionOutput<P> {
        SessionOutput {
            child: self.child,
            transcript: self.transcript,
            exit_status,
            answers_sent: self.answers_sent,
            command_log: self.command_log,
        }
    }

    /// Read one batch of output; returns whether anything new arrived.
    fn read_output(&mut self) -> Result<bool> {
        let outcome = self
            .child
            .read_available()
            .map_err(|e| QaError::io_context("reading command output", e.into()))?;
        match outcome {
            ReadOutcome::Data(bytes) => {
                if let Some(log) = self.command_log.as_mut() {
                    log.append(&bytes)?;
                }
                self.transcript.extend_from_slice(&bytes);
                Ok(true)
            }
            ReadOutcome::Empty | ReadOutcome::Closed => Ok(false),
        }
    }

    /// Match the transcript against the question rules and queue the answer.
    fn answer_prompt(&mut self) -> Result<Option<Iteration>> {
        let (index, answer, iteration) = {
            let Some(hit) = self.rules.find(&self.transcript) else {
                return Ok(None);
            };
            let answer = hit.rule.answer(self.cursors[hit.index], &hit.captures);
            let iteration = match hit.rule.kind() {
                RuleKind::Exact => Iteration::MatchedExact { rule: hit.index },
                RuleKind::Standard => Iteration::MatchedStandard { rule: hit.index },
            };
            tracing::debug!(
                command = %self.command,
                kind = %hit.rule.kind(),
                pattern = hit.rule.pattern(),
                answer = %String::from_utf8_lossy(&answer).trim_end(),
                out = %tail_of(&self.transcript, LOG_SNIPPET_LEN),
                "answering question"
            );
            (hit.index, answer, iteration)
        };

        self.cursors[index] = self.cursors[index].wrapping_add(1);
        self.pending.extend(answer);
        if self.flush_pending()? {
            self.answers_sent += 1;
        }
        Ok(Some(iteration))
    }

    /// Write as much pending input as the child accepts right now.
    ///
    /// Returns false if the child has closed its input and the pending
    /// bytes were dropped.
    fn flush_pending(&mut self) -> Result<bool> {
        while !self.pending.is_empty() {
            let (front, _) = self.pending.as_slices();
            let outcome = self
                .child
                .write(front)
                .map_err(|e| QaError::io_context("writing answer to command", e.into()))?;
            match outcome {
                WriteOutcome::Written(0) => break,
                WriteOutcome::Written(n) => {
                    self.pending.drain(..n.min(self.pending.len()));
                }
                WriteOutcome::Closed => {
                    tracing::debug!(
                        command = %self.command,
                        dropped = self.pending.len(),
                        "command closed its input; dropping pending answer bytes"
                    );
                    self.pending.clear();
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn terminate_for_stall(&mut self) {
        if let Err(e) = self.child.terminate_forcefully() {
            tracing::debug!(command = %self.command, error = %e, "killing stalled command failed");
        }
        self.pending.clear();
        self.state = SessionState::TerminatedByStall;

        tracing::debug!(
            command = %self.command,
            transcript = %String::from_utf8_lossy(&self.transcript),
            "full output of stalled command"
        );
        tracing::warn!(
            command = %self.command,
            stall_threshold = self.stall_threshold,
            tail = %self.tail(),
            "command stalled; maximum number of unproductive polls reached"
        );
    }
}

/// The last `len` bytes of `bytes`, lossily decoded.
pub(crate) fn tail_of(bytes: &[u8], len: usize) -> String {
    let start = bytes.len().saturating_sub(len);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::QaTable;
    use crate::test_utils::ScriptedProcess;

    fn config(threshold: u32) -> QaConfig {
        QaConfig::new()
            .stall_threshold(threshold)
            .poll_interval(Duration::from_millis(1))
    }

    fn session(
        process: ScriptedProcess,
        table: &QaTable,
        threshold: u32,
    ) -> InteractionSession<ScriptedProcess> {
        let rules = RuleSet::compile(table).unwrap();
        InteractionSession::new(process, "scripted", rules, &config(threshold))
    }

    #[tokio::test]
    async fn answers_prompt_once_and_exits() {
        let process = ScriptedProcess::new()
            .output("Continue? [y/n] ")
            .on_input_exit("y\n", "continuing\n", 0);
        let handle = process.handle();
        let table = QaTable::new().exact("Continue? [y/n]", "y");

        let output = session(process, &table, 10).run().await.unwrap();

        assert_eq!(output.exit_status, ExitStatus::Exited(0));
        assert_eq!(output.answers_sent, 1);
        assert_eq!(handle.written_str(), "y\n");
        assert_eq!(output.transcript, b"Continue? [y/n] continuing\n");
    }

    #[test]
    fn prompt_seen_once_is_answered_once() {
        let process = ScriptedProcess::new().output("Continue? [y/n] ");
        let handle = process.handle();
        let table = QaTable::new().exact("Continue? [y/n]", "y");
        let mut session = session(process, &table, 100);

        assert_eq!(session.step().unwrap(), Iteration::MatchedExact { rule: 0 });
        for _ in 0..10 {
            let iteration = session.step().unwrap();
            assert!(matches!(iteration, Iteration::NoMatch), "{iteration:?}");
        }
        assert_eq!(handle.written_str(), "y\n");
        assert_eq!(session.answers_sent(), 1);
    }

    #[test]
    fn exact_rule_outranks_standard_rule() {
        let process = ScriptedProcess::new().output("Overwrite existing files? ");
        let handle = process.handle();
        let table = QaTable::new()
            .standard(r"Overwrite.*\?", "n")
            .exact("Overwrite existing files?", "y");
        let mut session = session(process, &table, 10);

        assert_eq!(session.step().unwrap(), Iteration::MatchedExact { rule: 0 });
        assert_eq!(handle.written_str(), "y\n");
    }

    #[test]
    fn standard_rule_matches_when_no_exact_rule_does() {
        let process = ScriptedProcess::new().output("Install into /opt/tool? ");
        let handle = process.handle();
        let table = QaTable::new()
            .exact("Continue?", "y")
            .standard(r"Install into (?P<dir>\S+)\?", "${dir}/sub");
        let mut session = session(process, &table, 10);

        assert_eq!(session.step().unwrap(), Iteration::MatchedStandard { rule: 1 });
        assert_eq!(handle.written_str(), "/opt/tool/sub\n");
    }

    #[test]
    fn answers_rotate_per_rule() {
        let process = ScriptedProcess::new()
            .output("Name? ")
            .on_input("first\n", "Name? ")
            .on_input("first\nsecond\n", "Name? ")
            .on_input_exit("first\nsecond\nfirst\n", "", 0);
        let handle = process.handle();
        let table = QaTable::new().exact_cycle("Name?", ["first", "second"]);
        let mut session = session(process, &table, 10);

        while !session.state().is_terminal() {
            session.step().unwrap();
        }
        assert_eq!(handle.written_str(), "first\nsecond\nfirst\n");
        assert_eq!(session.answers_sent(), 3);
    }

    #[test]
    fn stalls_exactly_at_threshold() {
        let process = ScriptedProcess::new();
        let handle = process.handle();
        let mut session = session(process, &QaTable::new(), 4);

        for expected in 1..4 {
            assert_eq!(session.step().unwrap(), Iteration::NoMatch);
            assert_eq!(session.stall_count(), expected);
            assert_eq!(handle.kill_count(), 0);
        }
        assert_eq!(session.step().unwrap(), Iteration::TerminatedByStall);
        assert_eq!(session.state(), SessionState::TerminatedByStall);
        assert_eq!(handle.kill_count(), 1);

        let reads = handle.read_calls();
        let polls = handle.poll_calls();
        assert_eq!(session.step().unwrap(), Iteration::TerminatedByStall);
        assert_eq!(handle.read_calls(), reads);
        assert_eq!(handle.poll_calls(), polls);
        assert_eq!(handle.kill_count(), 1);
    }

    #[tokio::test]
    async fn unanswered_prompt_stalls_with_tail() {
        let process = ScriptedProcess::new().output("Enter license key: ");
        let handle = process.handle();
        let table = QaTable::new().exact("Continue? [y/n]", "y");

        let err = session(process, &table, 3).run().await.unwrap_err();

        match err {
            QaError::Stalled {
                stall_threshold,
                ref tail,
                ..
            } => {
                assert_eq!(stall_threshold, 3);
                assert!(tail.contains("Enter license key:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // one read that made progress, then three stalled ones
        assert_eq!(handle.read_calls(), 4);
        assert_eq!(handle.kill_count(), 1);
        assert!(handle.written().is_empty());
    }

    #[test]
    fn progress_resets_stall_counter() {
        let process = ScriptedProcess::new()
            .output("step 1\n")
            .silence(2)
            .output("step 2\n")
            .silence(2)
            .exit_after_script(0);
        let handle = process.handle();
        let mut session = session(process, &QaTable::new(), 3);

        let mut seen = Vec::new();
        loop {
            let iteration = session.step().unwrap();
            seen.push(iteration);
            if session.state().is_terminal() {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                Iteration::Progress,
                Iteration::NoMatch,
                Iteration::NoMatch,
                Iteration::Progress,
                Iteration::NoMatch,
                Iteration::NoMatch,
                Iteration::Exited(ExitStatus::Exited(0)),
            ]
        );
        assert_eq!(handle.kill_count(), 0);
    }

    #[test]
    fn no_op_output_keeps_session_alive() {
        let process = ScriptedProcess::new()
            .output("Compiling module.f90...\n")
            .silence(6)
            .exit_after_script(0);
        let table = QaTable::new().no_qa(r"Compiling \S+\.\.\.");
        let mut session = session(process, &table, 2);

        assert_eq!(session.step().unwrap(), Iteration::Progress);
        for _ in 0..6 {
            assert_eq!(session.step().unwrap(), Iteration::MatchedNoOp);
            assert_eq!(session.stall_count(), 0);
        }
        assert_eq!(
            session.step().unwrap(),
            Iteration::Exited(ExitStatus::Exited(0))
        );
    }

    #[test]
    fn short_writes_are_completed() {
        let process = ScriptedProcess::new()
            .write_limit(1)
            .output("Proceed? ")
            .on_input_exit("yes\n", "", 0);
        let handle = process.handle();
        let table = QaTable::new().exact("Proceed?", "yes");
        let mut session = session(process, &table, 10);

        session.step().unwrap();
        assert_eq!(session.pending_input(), 0);
        assert_eq!(handle.written_str(), "yes\n");
        assert!(handle.write_calls() >= 4);
    }

    #[test]
    fn answer_dropped_by_closed_stdin_is_not_counted() {
        let mut process = ScriptedProcess::new().output("Continue? [y/n] ");
        process.close_stdin();
        let handle = process.handle();
        let table = QaTable::new().exact("Continue? [y/n]", "y");
        let mut session = session(process, &table, 10);

        assert_eq!(session.step().unwrap(), Iteration::MatchedExact { rule: 0 });
        assert_eq!(session.answers_sent(), 0);
        assert_eq!(session.pending_input(), 0);
        assert_eq!(handle.written_str(), "");
    }

    #[tokio::test]
    async fn read_failure_ends_run_with_io_error() {
        let process = ScriptedProcess::new()
            .output("Installing...\n")
            .output("never seen\n")
            .fail_read_at(2);
        let handle = process.handle();

        let err = session(process, &QaTable::new(), 10).run().await.unwrap_err();

        match err {
            QaError::Io { context, .. } => assert_eq!(context, "reading command output"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(handle.read_calls(), 2);
        assert_eq!(handle.write_calls(), 0);
        assert_eq!(handle.kill_count(), 0);
    }

    #[tokio::test]
    async fn write_failure_ends_run_with_io_error() {
        let process = ScriptedProcess::new()
            .output("Continue? [y/n] ")
            .fail_write_at(1);
        let handle = process.handle();
        let table = QaTable::new().exact("Continue? [y/n]", "y");

        let err = session(process, &table, 10).run().await.unwrap_err();

        match err {
            QaError::Io { context, .. } => assert_eq!(context, "writing answer to command"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(handle.read_calls(), 1);
        assert_eq!(handle.write_calls(), 1);
    }

    #[tokio::test]
    async fn output_is_copied_to_command_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let process = ScriptedProcess::new()
            .output("Continue? [y/n] ")
            .on_input_exit("y\n", "bye\n", 0);
        let table = QaTable::new().exact("Continue? [y/n]", "y");
        let log = CommandLog::create(&path, "scripted").unwrap();

        let output = session(process, &table, 10)
            .with_command_log(log)
            .run()
            .await
            .unwrap();
        drop(output);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "scripted\n\nContinue? [y/n] bye\n");
    }

    #[test]
    fn tail_is_bounded() {
        assert_eq!(tail_of(b"abcdef", 3), "def");
        assert_eq!(tail_of(b"ab", 10), "ab");
    }
}
