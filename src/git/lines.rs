//! Subprocess output as a lazy stream of lines.
//!
//! `line_stream` spawns the process on first poll, reads stdout in chunks and
//! reassembles them into complete lines with `LineSplitter`. Stderr is drained
//! on a separate task and only reported if the exit status is not accepted.
//!
//! The child is owned by the stream. It is killed when the cancellation token
//! fires, and (via `kill_on_drop`) when the stream is dropped early.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::GitError;

const CHUNK_SIZE: usize = 8 * 1024;

/// Stderr kept for error reports; anything past this is read and discarded.
const STDERR_LIMIT: u64 = 64 * 1024;

/// Ordered, terminator-stripped lines of a process's stdout. A non-accepted
/// exit status arrives as a final `Err` after every line already read.
pub type LineStream = BoxStream<'static, Result<String, GitError>>;

/// Splits raw output chunks into lines, carrying partial lines between chunks.
#[derive(Debug, Clone)]
pub struct LineSplitter {
    terminator: Vec<u8>,
    carry: Vec<u8>,
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::with_terminator(b"\n".to_vec())
    }

    pub fn with_terminator(terminator: impl Into<Vec<u8>>) -> Self {
        let terminator = terminator.into();
        assert!(!terminator.is_empty(), "line terminator must not be empty");
        Self {
            terminator,
            carry: Vec::new(),
        }
    }

    /// Feed one chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // A terminator may straddle the old carry and the new chunk
        let mut search_from = self.carry.len().saturating_sub(self.terminator.len() - 1);
        self.carry.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = find(&self.carry[search_from..], &self.terminator) {
            let end = search_from + pos;
            lines.push(String::from_utf8_lossy(&self.carry[start..end]).into_owned());
            start = end + self.terminator.len();
            search_from = start;
        }
        self.carry.drain(..start);
        lines
    }

    /// Flush the trailing unterminated fragment, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.carry);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// One external command execution: stdin discarded, stdout and stderr piped.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub accepted_exit_codes: Vec<i32>,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            accepted_exit_codes: vec![0],
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Treat `code` as a normal completion rather than a failure.
    pub fn accept_exit_code(mut self, code: i32) -> Self {
        if !self.accepted_exit_codes.contains(&code) {
            self.accepted_exit_codes.push(code);
        }
        self
    }

    fn spawn(&self) -> Result<Child, GitError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command.spawn().map_err(|source| GitError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

/// Keep the first `STDERR_LIMIT` bytes and keep draining so the child never
/// blocks on a full pipe.
async fn drain_stderr<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut bytes = Vec::new();
    let _ = (&mut pipe).take(STDERR_LIMIT).read_to_end(&mut bytes).await;
    let _ = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Run `invocation` and stream its stdout line by line.
///
/// Nothing is spawned until the stream is first polled.
pub fn line_stream(invocation: ProcessInvocation, cancel: CancellationToken) -> LineStream {
    stream::unfold(Stage::Idle(invocation, cancel), |stage| async move {
        match stage {
            Stage::Idle(invocation, cancel) => match LineReader::start(invocation, cancel) {
                Ok(reader) => Box::new(reader).next_line().await,
                Err(e) => Some((Err(e), Stage::Finished)),
            },
            Stage::Reading(reader) => reader.next_line().await,
            Stage::Finished => None,
        }
    })
    .boxed()
}

enum Stage {
    Idle(ProcessInvocation, CancellationToken),
    Reading(Box<LineReader>),
    Finished,
}

struct LineReader {
    invocation: ProcessInvocation,
    child: Child,
    stdout: ChildStdout,
    stderr: JoinHandle<String>,
    splitter: LineSplitter,
    pending: VecDeque<String>,
    buf: Vec<u8>,
    eof: bool,
    cancel: CancellationToken,
}

impl LineReader {
    fn start(invocation: ProcessInvocation, cancel: CancellationToken) -> Result<Self, GitError> {
        let mut child = invocation.spawn()?;
        tracing::debug!(
            program = %invocation.program,
            args = ?invocation.args,
            cwd = %invocation.work_dir.display(),
            pid = ?child.id(),
            "spawned process"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GitError::Io(std::io::Error::other("stdout was not captured")))?;

        let stderr = match child.stderr.take() {
            Some(pipe) => tokio::spawn(drain_stderr(pipe)),
            None => tokio::spawn(async { String::new() }),
        };

        Ok(Self {
            invocation,
            child,
            stdout,
            stderr,
            splitter: LineSplitter::new(),
            pending: VecDeque::new(),
            buf: vec![0; CHUNK_SIZE],
            eof: false,
            cancel,
        })
    }

    async fn next_line(mut self: Box<Self>) -> Option<(Result<String, GitError>, Stage)> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some((Ok(line), Stage::Reading(self)));
            }

            if self.eof {
                return self.exit_status().await.map(|e| (Err(e), Stage::Finished));
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.terminate().await;
                    return None;
                }
                read = self.stdout.read(&mut self.buf) => read,
            };

            match read {
                Ok(0) => {
                    self.eof = true;
                    if let Some(rest) = self.splitter.finish() {
                        self.pending.push_back(rest);
                    }
                }
                Ok(n) => {
                    let lines = self.splitter.push(&self.buf[..n]);
                    self.pending.extend(lines);
                }
                Err(e) => {
                    self.terminate().await;
                    return Some((Err(GitError::Io(e)), Stage::Finished));
                }
            }
        }
    }

    /// Reap the child after stdout closed; `Some` if its status is a failure.
    async fn exit_status(&mut self) -> Option<GitError> {
        let status = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.terminate().await;
                return None;
            }
            status = self.child.wait() => status,
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => return Some(GitError::Io(e)),
        };
        let stderr = (&mut self.stderr).await.unwrap_or_default();

        tracing::debug!(program = %self.invocation.program, %status, "process exited");

        let accepted = status
            .code()
            .is_some_and(|code| self.invocation.accepted_exit_codes.contains(&code));
        if accepted {
            None
        } else {
            Some(GitError::Exit {
                program: self.invocation.program.clone(),
                status,
                stderr,
            })
        }
    }

    async fn terminate(&mut self) {
        tracing::debug!(program = %self.invocation.program, pid = ?self.child.id(), "terminating process");
        if let Err(e) = self.child.kill().await {
            tracing::warn!(program = %self.invocation.program, error = %e, "failed to kill process");
        }
    }
}
