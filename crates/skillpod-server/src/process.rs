//! Command supervision: spawn `/bin/sh -c`, capture output, enforce the timeout.
//!
//! Each command runs in its own process group. On timeout the whole group gets
//! SIGTERM, then SIGKILL after [`KILL_GRACE`]. Output captured before the kill
//! is kept. Buffered output is capped per stream at [`CommandSpec::max_output`];
//! streamed output is forwarded and never accumulated.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;

use skillpod_core::protocol::ExecutionResult;

use crate::events::EventSink;

pub const SHELL: &str = "/bin/sh";
/// Delay between SIGTERM and SIGKILL for a timed-out group.
pub const KILL_GRACE: Duration = Duration::from_secs(2);
/// How long to keep reading pipes after the shell exited.
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);
const READ_BUF: usize = 8192;

/// One command to supervise.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: String,
    pub cwd: PathBuf,
    pub timeout: Duration,
    /// PATH handed to the command.
    pub path_env: String,
    pub home: PathBuf,
    pub stdin: Option<String>,
    /// Bytes kept per stream for the buffered result.
    pub max_output: usize,
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Failed to start command: '{target}' not found")]
    NotFound { target: String },

    #[error("Failed to start command: permission denied for '{target}'")]
    PermissionDenied { target: String },

    #[error("Failed to start command: {0}")]
    Io(#[source] std::io::Error),
}

impl SpawnError {
    fn classify(err: std::io::Error, spec: &CommandSpec) -> Self {
        // Spawn reports a missing cwd the same way as a missing shell.
        let target = if spec.cwd.is_dir() {
            SHELL.to_string()
        } else {
            spec.cwd.display().to_string()
        };
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { target },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { target },
            _ => Self::Io(err),
        }
    }
}

/// Final state of a supervised command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub wait_error: Option<String>,
}

impl Outcome {
    /// Exit code with the shell convention `128 + signal` for signalled processes.
    pub fn effective_exit_code(&self) -> i32 {
        self.exit_code
            .or_else(|| self.signal.map(|s| 128 + s))
            .unwrap_or(1)
    }

    pub fn signal_name(&self) -> Option<String> {
        self.signal.map(signal_name)
    }

    pub fn into_result(self, timeout: Duration) -> ExecutionResult {
        if let Some(message) = self.wait_error {
            return ExecutionResult::failure(message);
        }
        let code = self.effective_exit_code();
        if self.timed_out {
            ExecutionResult::timed_out(self.stdout, self.stderr, code, timeout.as_millis() as u64)
        } else {
            ExecutionResult::completed(self.stdout, self.stderr, code)
        }
    }
}

/// A spawned command, not yet waited on.
pub struct Running {
    child: Child,
    spec: CommandSpec,
}

impl Running {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

pub fn spawn(spec: CommandSpec) -> Result<Running, SpawnError> {
    let mut cmd = Command::new(SHELL);
    cmd.arg("-c")
        .arg(&spec.command)
        .current_dir(&spec.cwd)
        .env("PATH", &spec.path_env)
        .env("HOME", &spec.home)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| SpawnError::classify(e, &spec))?;

    if let (Some(input), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                tracing::debug!(error = %e, "stdin write failed");
            }
        });
    }
    tracing::debug!(pid = ?child.id(), cwd = %spec.cwd.display(), "command spawned");
    Ok(Running { child, spec })
}

/// Spawn and wait for the buffered result. Spawn failures become a failed result.
pub async fn run_buffered(spec: CommandSpec) -> ExecutionResult {
    let timeout = spec.timeout;
    match spawn(spec) {
        Ok(running) => supervise(running, None).await.into_result(timeout),
        Err(e) => {
            tracing::warn!(error = %e, "spawn failed");
            ExecutionResult::failure(e.to_string())
        }
    }
}

/// Output of one pipe, kept up to `limit` bytes.
#[derive(Debug)]
struct OutputBuffer {
    text: String,
    limit: usize,
    total: usize,
}

impl OutputBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            total: 0,
        }
    }

    fn push(&mut self, data: &str) {
        let truncated = self.total > self.text.len();
        self.total += data.len();
        if truncated {
            return;
        }
        let room = self.limit.saturating_sub(self.text.len());
        if data.len() <= room {
            self.text.push_str(data);
            return;
        }
        let mut end = room;
        while !data.is_char_boundary(end) {
            end -= 1;
        }
        self.text.push_str(&data[..end]);
    }

    fn into_string(self) -> String {
        if self.total > self.text.len() {
            format!(
                "{}\n[... output truncated: {} total bytes ...]\n",
                self.text, self.total
            )
        } else {
            self.text
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    Stdout,
    Stderr,
}

/// Wait for the command.
///
/// With a `sink`, output is forwarded as it arrives and the returned outcome
/// carries no stdout or stderr. Without one, output is buffered up to the cap.
pub async fn supervise(running: Running, sink: Option<&EventSink>) -> Outcome {
    let Running { mut child, spec } = running;
    let (tx, mut rx) = mpsc::channel::<(Pipe, String)>(32);
    if let Some(out) = child.stdout.take() {
        tokio::spawn(pump(out, Pipe::Stdout, tx.clone()));
    }
    if let Some(err) = child.stderr.take() {
        tokio::spawn(pump(err, Pipe::Stderr, tx.clone()));
    }
    drop(tx);

    let pid = child.id();
    let mut outcome = Outcome::default();
    let mut stdout = OutputBuffer::new(spec.max_output);
    let mut stderr = OutputBuffer::new(spec.max_output);
    let mut status: Option<std::io::Result<ExitStatus>> = None;
    let mut pipes_open = true;
    let mut deadline_armed = true;
    let deadline = tokio::time::sleep(spec.timeout);
    tokio::pin!(deadline);

    while status.is_none() || pipes_open {
        tokio::select! {
            chunk = rx.recv(), if pipes_open => match chunk {
                Some((Pipe::Stdout, data)) => match sink {
                    Some(sink) => sink.stdout(&data).await,
                    None => stdout.push(&data),
                },
                Some((Pipe::Stderr, data)) => match sink {
                    Some(sink) => sink.stderr(&data).await,
                    None => stderr.push(&data),
                },
                None => pipes_open = false,
            },
            res = child.wait(), if status.is_none() => {
                status = Some(res);
                // Background jobs may hold the pipes open; bound the drain.
                deadline.as_mut().reset(Instant::now() + OUTPUT_DRAIN);
                deadline_armed = true;
            }
            _ = &mut deadline, if deadline_armed => {
                deadline_armed = false;
                if status.is_some() {
                    tracing::debug!(?pid, "output drain window elapsed");
                    break;
                }
                outcome.timed_out = true;
                tracing::info!(?pid, timeout_ms = spec.timeout.as_millis() as u64, "command timed out");
                if let Some(sink) = sink {
                    sink.timeout(spec.timeout.as_millis() as u64).await;
                }
                terminate(pid, &mut child);
            }
        }
    }

    match status {
        Some(Ok(status)) => {
            outcome.exit_code = status.code();
            outcome.signal = exit_signal(&status);
        }
        Some(Err(e)) => outcome.wait_error = Some(format!("Failed to wait for command: {}", e)),
        None => {}
    }
    outcome.stdout = stdout.into_string();
    outcome.stderr = stderr.into_string();
    outcome
}

async fn pump<R>(mut reader: R, pipe: Pipe, tx: mpsc::Sender<(Pipe, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF];
    let mut carry: Vec<u8> = Vec::new();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let text = decode_utf8_chunk(&mut carry, &buf[..n]);
        if !text.is_empty() && tx.send((pipe, text)).await.is_err() {
            return;
        }
    }
    if !carry.is_empty() {
        let _ = tx.send((pipe, String::from_utf8_lossy(&carry).to_string())).await;
    }
}

/// Decode `bytes` appended to `carry`, keeping an incomplete trailing sequence.
fn decode_utf8_chunk(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    let valid = match std::str::from_utf8(carry) {
        Ok(_) => carry.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(carry).to_string();
            carry.clear();
            return text;
        }
    };
    let rest = carry.split_off(valid);
    let text = String::from_utf8_lossy(carry).to_string();
    *carry = rest;
    text
}

/// SIGTERM the group now, SIGKILL it after the grace period.
#[cfg(unix)]
fn terminate(pid: Option<u32>, child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        let _ = child.start_kill();
        return;
    };
    let group = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(group, Signal::SIGTERM) {
        tracing::debug!(pid, error = %e, "SIGTERM to group failed");
        let _ = child.start_kill();
    }
    tokio::spawn(async move {
        tokio::time::sleep(KILL_GRACE).await;
        // ESRCH once the group is gone.
        let _ = killpg(group, Signal::SIGKILL);
    });
}

#[cfg(not(unix))]
fn terminate(_pid: Option<u32>, child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| signal.to_string())
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    signal.to_string()
}

/// Single-quote `s` for `/bin/sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
