/// Shared infrastructure for subprocess-backed agent streams.
///
/// Centralizes process spawning, the line-by-line read loop, stderr and exit
/// code finalization, and cancellation, exposing all of it as a lazy
/// [`Iterator`] of [`Response`] values.

use std::io::{self, BufReader, Read};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::agent::{CancelToken, Response};
use super::stream_parser::{classify_error_text, StreamParser};
use super::utils::write_debug_log;

/// How long a terminated child gets to exit before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Poll interval for stdout reads and for the terminate grace loop.
const WAIT_POLL: Duration = Duration::from_millis(20);

const READ_CHUNK: usize = 8192;

pub const INTERRUPTED_MESSAGE: &str = "Interrupted by user";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Failed to start {provider}: {source}. Is {provider} CLI installed?")]
    Spawn {
        provider: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to capture stdout")]
    MissingStdout,
    #[error("Process error: {0}")]
    Wait(#[source] std::io::Error),
}

impl From<StreamError> for Response {
    fn from(err: StreamError) -> Self {
        Response::error(err.to_string(), None)
    }
}

/// Configuration for spawning a provider CLI process.
pub struct StreamingConfig<'a> {
    pub provider_name: &'a str,
    pub binary_path: &'a str,
    pub args: &'a [String],
    /// Extra environment variables to set on the child process.
    pub env_vars: &'a [(&'a str, &'a str)],
    /// Environment variables to remove from the child process.
    pub env_remove: &'a [&'a str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stdout,
    Stderr,
    Exit,
    Done,
}

/// Result of waiting for the next stdout line.
enum LineRead {
    Line(String),
    Eof,
    Cancelled,
    Failed(io::Error),
}

/// A running provider process viewed as a response sequence.
///
/// Yields once per classified stdout line, then at most once for stderr and
/// once for a failing exit status. Dropping the stream terminates the child.
///
/// The child leads its own process group; termination signals the whole group
/// so helpers it spawned cannot keep the stdout pipe open.
pub struct ProcessStream<'a> {
    provider_name: String,
    child: Child,
    stdout: ChildStdout,
    /// Bytes read from stdout but not yet returned as a line
    pending: Vec<u8>,
    stdout_eof: bool,
    stderr: Option<ChildStderr>,
    parser: &'a mut StreamParser,
    cancel: Option<&'a CancelToken>,
    phase: Phase,
    line_count: u64,
    stderr_reported: bool,
}

/// Spawn a provider CLI and return its stdout as a lazy response stream.
pub fn spawn_stream<'a>(
    config: &StreamingConfig,
    parser: &'a mut StreamParser,
    cancel: Option<&'a CancelToken>,
) -> Result<ProcessStream<'a>, StreamError> {
    let log = |msg: &str| write_debug_log(config.provider_name, msg);

    log("========================================");
    log(&format!("=== {} stream START ===", config.provider_name));
    log(&format!("Command: {} {:?}", config.binary_path, config.args));

    let spawn_start = Instant::now();
    let mut cmd = Command::new(config.binary_path);
    cmd.args(config.args)
       .stdin(Stdio::null())
       .stdout(Stdio::piped())
       .stderr(Stdio::piped());

    for &(key, val) in config.env_vars {
        cmd.env(key, val);
    }
    for &key in config.env_remove {
        cmd.env_remove(key);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|source| {
        log(&format!("ERROR: Failed to spawn: {}", source));
        StreamError::Spawn { provider: config.provider_name.to_string(), source }
    })?;
    log(&format!("{} process spawned in {:?}, pid={}",
                 config.provider_name, spawn_start.elapsed(), child.id()));

    // Store child PID (also its process group id) so a signal handler can reach it
    if let Some(token) = cancel {
        token.child_pid.store(child.id(), Ordering::SeqCst);
    }

    let stderr = child.stderr.take();
    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            terminate_child(&mut child, config.provider_name);
            return Err(StreamError::MissingStdout);
        }
    };

    Ok(ProcessStream {
        provider_name: config.provider_name.to_string(),
        child,
        stdout,
        pending: Vec::new(),
        stdout_eof: false,
        stderr,
        parser,
        cancel,
        phase: Phase::Stdout,
        line_count: 0,
        stderr_reported: false,
    })
}

impl ProcessStream<'_> {
    fn log(&self, msg: &str) {
        write_debug_log(&self.provider_name, msg);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.map(CancelToken::is_cancelled).unwrap_or(false)
    }

    fn interrupt(&mut self) -> Option<Response> {
        self.log("Cancel detected, terminating child process");
        terminate_child(&mut self.child, &self.provider_name);
        self.finish();
        Some(Response::error(INTERRUPTED_MESSAGE, None))
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        if let Some(token) = self.cancel {
            token.child_pid.store(0, Ordering::SeqCst);
        }
    }

    /// Next raw stdout line; invalid UTF-8 is replaced rather than rejected.
    /// Never blocks longer than [`WAIT_POLL`] without checking the cancel flag.
    fn read_line(&mut self) -> LineRead {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return LineRead::Line(String::from_utf8_lossy(&line).into_owned());
            }
            if self.stdout_eof {
                if self.pending.is_empty() {
                    return LineRead::Eof;
                }
                let rest = std::mem::take(&mut self.pending);
                return LineRead::Line(String::from_utf8_lossy(&rest).into_owned());
            }
            if self.is_cancelled() {
                return LineRead::Cancelled;
            }
            match wait_readable(&self.stdout, WAIT_POLL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => return LineRead::Failed(e),
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.stdout.read(&mut chunk) {
                Ok(0) => self.stdout_eof = true,
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return LineRead::Failed(e),
            }
        }
    }

    fn next_stdout(&mut self) -> Option<Response> {
        loop {
            let line = match self.read_line() {
                LineRead::Line(line) => line,
                LineRead::Cancelled => return self.interrupt(),
                LineRead::Failed(e) => {
                    self.log(&format!("ERROR: Failed to read line: {}", e));
                    self.phase = Phase::Stderr;
                    return Some(Response::error(format!("Failed to read output: {}", e), None));
                }
                LineRead::Eof => {
                    self.log(&format!("Read loop finished, total lines: {}", self.line_count));
                    // A signal that killed the child also ends stdout
                    if self.is_cancelled() {
                        return self.interrupt();
                    }
                    self.phase = Phase::Stderr;
                    return None;
                }
            };
            // Output that arrives after a cancel is not shown
            if self.is_cancelled() {
                return self.interrupt();
            }

            self.line_count += 1;
            if line.trim().is_empty() {
                continue;
            }
            self.log(&format!("Line {}: {}", self.line_count, line.chars().take(200).collect::<String>()));

            if let Some(response) = self.parser.parse_line(&line) {
                return Some(response);
            }
        }
    }

    fn next_stderr(&mut self) -> Option<Response> {
        self.phase = Phase::Exit;
        let text = read_stderr(self.stderr.take())?;
        self.log(&format!("stderr: {}", text.chars().take(500).collect::<String>()));
        self.stderr_reported = true;
        let error_type = classify_error_text(&text);
        Some(Response::error(text, error_type))
    }

    fn next_exit(&mut self) -> Option<Response> {
        let status = self.child.wait().map_err(StreamError::Wait);
        self.finish();
        match status {
            Ok(status) => {
                self.log(&format!("Process finished, exit_code: {:?}", status.code()));
                if status.success() || self.stderr_reported {
                    None
                } else {
                    Some(Response::error(exit_message(&status), None))
                }
            }
            Err(e) => Some(e.into()),
        }
    }
}

impl Iterator for ProcessStream<'_> {
    type Item = Response;

    fn next(&mut self) -> Option<Response> {
        loop {
            let response = match self.phase {
                Phase::Stdout => self.next_stdout(),
                Phase::Stderr => self.next_stderr(),
                Phase::Exit => self.next_exit(),
                Phase::Done => return None,
            };
            if response.is_some() {
                return response;
            }
        }
    }
}

impl Drop for ProcessStream<'_> {
    fn drop(&mut self) {
        if self.phase != Phase::Done {
            self.log("Stream dropped before completion, terminating child process");
            terminate_child(&mut self.child, &self.provider_name);
            self.finish();
        }
    }
}

fn exit_message(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("Claude CLI exited with code {}", code),
        None => "Claude CLI was terminated by a signal".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Send `signal` to every process in the group led by `pid`.
#[cfg(unix)]
pub fn signal_group(pid: u32, signal: libc::c_int) {
    if pid == 0 {
        return;
    }
    #[allow(unsafe_code)]
    unsafe { libc::kill(-(pid as libc::pid_t), signal); }
}

/// Ask the child's process group to stop, killing it if the child is still
/// alive after [`TERMINATE_GRACE`]. Returns within the grace period plus one poll.
pub fn terminate_child(child: &mut Child, provider_name: &str) {
    let pid = child.id();
    if let Ok(Some(_)) = child.try_wait() {
        // Leftover helpers may still hold our pipes
        #[cfg(unix)]
        signal_group(pid, libc::SIGKILL);
        return;
    }

    #[cfg(unix)]
    {
        // SIGTERM first so the CLI can clean up
        signal_group(pid, libc::SIGTERM);

        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => {
                    write_debug_log(provider_name, &format!("Child exited after SIGTERM: {:?}", status.code()));
                    signal_group(pid, libc::SIGKILL);
                    return;
                }
                Ok(None) => std::thread::sleep(WAIT_POLL),
                Err(_) => break,
            }
        }

        write_debug_log(provider_name, &format!("Killing process group {}", pid));
        signal_group(pid, libc::SIGKILL);
    }

    let _ = child.kill();
    let _ = child.wait();
}

/// Wait up to `timeout` for stdout to become readable (data or hangup).
#[cfg(unix)]
fn wait_readable(stdout: &ChildStdout, timeout: Duration) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let mut fds = libc::pollfd {
        fd: stdout.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    #[allow(unsafe_code)]
    let rc = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        // SIGINT lands here; the caller re-checks the cancel flag
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0)
}

/// Without poll(2) the read simply blocks.
#[cfg(not(unix))]
fn wait_readable(_stdout: &ChildStdout, _timeout: Duration) -> io::Result<bool> {
    Ok(true)
}

fn read_stderr(stderr_handle: Option<ChildStderr>) -> Option<String> {
    stderr_handle.and_then(|h| {
        let mut buf = String::new();
        BufReader::new(h).read_to_string(&mut buf).ok()?;
        let trimmed = buf.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
