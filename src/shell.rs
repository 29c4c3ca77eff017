//! Persistent privileged shell
//!
//! Keeps one long-lived `su` process (or any shell configured in `[shell]`)
//! and feeds it command lines over stdin. A persistent process means the
//! user's root manager only prompts once instead of on every command.
//!
//! Synchronous commands are framed by a per-command marker. Before the
//! command the shell prints `<marker>:begin` on stderr, and after it
//! `<marker>:<exit status>` on stdout; the caller blocks until that exact
//! marker comes back. stderr output between the two fails the command
//! immediately, while stderr from earlier detached commands is discarded.
//! stdout and stderr are pumped by two reader threads into one channel.
//!
//! Only one command is in flight at a time; the session lives behind a mutex.

use crate::config::ShellConfig;
use crate::error::ShellError;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

/// Prefix of the completion marker line
const MARKER_PREFIX: &str = "__switchbridge_cmd_";

/// A shell that runs commands with elevated privileges
///
/// The bridge, relay and actions only talk to this trait so they can be
/// exercised against a recording fake.
pub trait PrivilegedShell: Send + Sync {
    /// Write a command without waiting for it to finish
    fn run_detached(&self, command: &str) -> Result<(), ShellError>;

    /// Run a command and block until it finishes, returning whether it succeeded
    fn run_sync(&self, command: &str) -> bool;

    /// Whether the privileged shell is (or can be made) running
    fn is_available(&self) -> bool;
}

/// A line read from the shell
#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellOutput {
    Stdout(String),
    Stderr(String),
}

/// One running privileged process and its pipes
struct Session {
    child: Child,
    stdin: ChildStdin,
    output: Receiver<ShellOutput>,
    next_marker: u64,
}

impl Session {
    fn spawn(config: &ShellConfig) -> Result<Self, ShellError> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ShellError::Spawn {
                program: config.program.clone(),
                reason: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| ShellError::Spawn {
            program: config.program.clone(),
            reason: "stdin not available".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ShellError::Spawn {
            program: config.program.clone(),
            reason: "stdout not available".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ShellError::Spawn {
            program: config.program.clone(),
            reason: "stderr not available".to_string(),
        })?;

        let (tx, output) = mpsc::channel();
        spawn_pump("stdout", stdout, tx.clone(), ShellOutput::Stdout)?;
        spawn_pump("stderr", stderr, tx, ShellOutput::Stderr)?;

        tracing::info!(
            "Started privileged shell '{}' (pid {})",
            config.program,
            child.id()
        );

        Ok(Self {
            child,
            stdin,
            output,
            next_marker: 0,
        })
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn write_line(&mut self, line: &str) -> Result<(), ShellError> {
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.write_all(b"\n"))
            .and_then(|_| self.stdin.flush())
            .map_err(ShellError::Write)
    }

    /// Discard output left over from detached or abandoned commands
    fn drain_pending(&mut self) {
        loop {
            match self.output.try_recv() {
                Ok(ShellOutput::Stderr(line)) => {
                    tracing::debug!("Discarding stale shell stderr: {}", line)
                }
                Ok(ShellOutput::Stdout(line)) => {
                    tracing::trace!("Discarding stale shell stdout: {}", line)
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    fn take_marker(&mut self) -> String {
        let marker = format!("{}{}__", MARKER_PREFIX, self.next_marker);
        self.next_marker += 1;
        marker
    }

    fn recv(&self, timeout: Option<Duration>) -> Result<ShellOutput, ShellError> {
        match timeout {
            Some(timeout) => self.output.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => ShellError::Timeout(timeout.as_millis() as u64),
                RecvTimeoutError::Disconnected => ShellError::Exited,
            }),
            None => self.output.recv().map_err(|_| ShellError::Exited),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Forward every line of a pipe into the shared output channel
fn spawn_pump<R: Read + Send + 'static>(
    name: &str,
    pipe: R,
    tx: Sender<ShellOutput>,
    wrap: fn(String) -> ShellOutput,
) -> Result<(), ShellError> {
    std::thread::Builder::new()
        .name(format!("su-{}", name))
        .spawn(move || {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                // Binary output must not stop the pump, or the shell dies on SIGPIPE
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches('\n').trim_end_matches('\r');
                if tx.send(wrap(line.to_string())).is_err() {
                    break;
                }
            }
        })
        .map(|_| ())
        .map_err(|e| ShellError::Spawn {
            program: name.to_string(),
            reason: e.to_string(),
        })
}

/// Build the command line that reports start and completion of `command`
fn framed(command: &str, marker: &str) -> String {
    // Leading newline so the marker starts a line even after unterminated output
    format!(
        "printf '\\n{}\\n' >&2\n{}\nprintf '\\n{}:%d\\n' $?",
        begin_line(marker),
        command,
        marker
    )
}

/// Line written to stderr just before the command runs
fn begin_line(marker: &str) -> String {
    format!("{}:begin", marker)
}

/// Parse a marker line, returning the exit status if it belongs to `marker`
fn parse_marker(line: &str, marker: &str) -> Option<i32> {
    line.strip_prefix(marker)?.strip_prefix(':')?.trim().parse().ok()
}

/// Quote a string for safe use as a single shell word
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The persistent privileged shell
pub struct RootShell {
    config: ShellConfig,
    session: Mutex<Option<Session>>,
}

impl RootShell {
    /// Create the shell; the process is spawned lazily on first use
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            config: config.clone(),
            session: Mutex::new(None),
        }
    }

    /// Run `<program> -c <command>` as a one-shot process and report success
    pub fn run_oneshot(&self, command: &str) -> bool {
        Command::new(&self.config.program)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Return the live session, spawning one if there is none or it exited
    fn live_session<'a>(
        &self,
        slot: &'a mut Option<Session>,
    ) -> Result<&'a mut Session, ShellError> {
        let alive = slot.as_mut().map(Session::is_alive).unwrap_or(false);
        if !alive {
            if slot.take().is_some() {
                tracing::warn!("Privileged shell exited, starting a new one");
            }
            if self.config.probe && !self.run_oneshot(":") {
                return Err(ShellError::ProbeFailed(self.config.program.clone()));
            }
            *slot = Some(Session::spawn(&self.config)?);
        }
        slot.as_mut().ok_or(ShellError::Exited)
    }

    fn try_run_sync(&self, command: &str) -> Result<bool, ShellError> {
        let mut guard = self.session.lock().map_err(|_| ShellError::Poisoned)?;
        let session = self.live_session(&mut guard)?;
        let timeout = self.config.sync_timeout_ms.map(Duration::from_millis);

        session.drain_pending();
        let marker = session.take_marker();
        let begin = begin_line(&marker);
        session.write_line(&framed(command, &marker))?;
        tracing::debug!("su> {}", command);

        let mut started = false;
        loop {
            match session.recv(timeout)? {
                ShellOutput::Stderr(line) if started => {
                    tracing::debug!("Command failed on stderr: {}", line);
                    return Ok(false);
                }
                ShellOutput::Stderr(line) => {
                    if line == begin {
                        started = true;
                    } else if !line.is_empty() {
                        tracing::debug!("Discarding earlier shell stderr: {}", line);
                    }
                }
                ShellOutput::Stdout(line) => {
                    if let Some(status) = parse_marker(&line, &marker) {
                        tracing::trace!("Command exited with status {}", status);
                        return Ok(status == 0);
                    }
                    if !line.is_empty() {
                        tracing::trace!("su< {}", line);
                    }
                }
            }
        }
    }
}

impl PrivilegedShell for RootShell {
    fn run_detached(&self, command: &str) -> Result<(), ShellError> {
        let mut guard = self.session.lock().map_err(|_| ShellError::Poisoned)?;
        let session = self.live_session(&mut guard)?;
        tracing::debug!("su& {}", command);
        session.write_line(command)
    }

    fn run_sync(&self, command: &str) -> bool {
        match self.try_run_sync(command) {
            Ok(success) => success,
            Err(e) => {
                tracing::warn!("Privileged command '{}' failed: {}", command, e);
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        let Ok(mut guard) = self.session.lock() else {
            return false;
        };
        match self.live_session(&mut guard) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Privileged shell unavailable: {}", e);
                false
            }
        }
    }
}
