use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use crate::config::{DEFAULT_CMD_TIMEOUT_SECS, env_secs};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeoutInfo {
    pub label: String,
    pub timeout_secs: u64,
}

#[derive(Debug)]
pub enum ProcessError {
    Timeout(TimeoutInfo),
    /// The program could not be started (missing binary, permissions).
    Spawn(std::io::Error),
    Message(String),
}

impl ProcessError {
    pub fn timeout_info(&self) -> Option<&TimeoutInfo> {
        match self {
            Self::Timeout(info) => Some(info),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(info) => {
                write!(f, "{} timed out after {}s", info.label, info.timeout_secs)
            }
            Self::Spawn(e) => write!(f, "spawn failed: {e}"),
            Self::Message(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Default timeout for plumbing commands, picked by label.
pub fn timeout_secs_for_label(label: &str) -> u64 {
    let lower = label.to_ascii_lowercase();
    if lower.starts_with("git")
        && let Some(v) = env_secs("BUMMR_TIMEOUT_GIT_SECS")
    {
        return v;
    }
    if lower.starts_with("bundle")
        && let Some(v) = env_secs("BUMMR_TIMEOUT_BUNDLE_SECS")
    {
        return v;
    }
    env_secs("BUMMR_CMD_TIMEOUT_SECS").unwrap_or(DEFAULT_CMD_TIMEOUT_SECS)
}

fn timeout_error(label: &str, timeout: Duration) -> ProcessError {
    ProcessError::Timeout(TimeoutInfo {
        label: label.to_string(),
        timeout_secs: timeout.as_secs(),
    })
}

fn terminate_pid(pid: u32) {
    let pid_s = pid.to_string();
    let _ = Command::new("kill").args(["-TERM", &pid_s]).status();
}

fn kill_pid(pid: u32) {
    let pid_s = pid.to_string();
    let _ = Command::new("kill").args(["-KILL", &pid_s]).status();
}

fn spawn(cmd: &mut Command) -> Result<Child, ProcessError> {
    cmd.spawn().map_err(ProcessError::Spawn)
}

fn wait_child_status(
    child: &mut Child,
    label: &str,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ProcessError> {
    let Some(timeout) = timeout else {
        return child
            .wait()
            .map_err(|e| ProcessError::Message(format!("{label} wait failed: {e}")));
    };
    match child
        .wait_timeout(timeout)
        .map_err(|e| ProcessError::Message(format!("{label} wait timeout error: {e}")))?
    {
        Some(status) => Ok(status),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(timeout_error(label, timeout))
        }
    }
}

/// Runs with inherited stdio; `None` waits forever.
pub fn run_command_status(
    mut cmd: Command,
    label: &str,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ProcessError> {
    let mut child = spawn(&mut cmd)?;
    wait_child_status(&mut child, label, timeout)
}

pub fn run_command_output_with_timeout(
    mut cmd: Command,
    label: &str,
) -> Result<Output, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = spawn(&mut cmd)?;
    let pid = child.id();
    let timeout = Duration::from_secs(timeout_secs_for_label(label));
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });
    match rx.recv_timeout(timeout) {
        Ok(res) => {
            res.map_err(|e| ProcessError::Message(format!("{label} read output failed: {e}")))
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            terminate_pid(pid);
            if rx.recv_timeout(Duration::from_secs(2)).is_err() {
                kill_pid(pid);
            }
            Err(timeout_error(label, timeout))
        }
        Err(_) => Err(ProcessError::Message(format!(
            "{label} output worker channel closed unexpectedly"
        ))),
    }
}

/// Exit status plus whether the line stream was cut short by the timeout.
#[derive(Debug)]
pub struct StreamExit {
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
}

fn forward_lines<R: Read + Send + 'static>(reader: R, tx: mpsc::Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
                Ok(_) => {
                    // Test suites print arbitrary bytes; keep reading past them.
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Spawns `cmd` and hands every stdout/stderr line to `on_line` as it arrives.
pub fn run_command_streaming(
    mut cmd: Command,
    label: &str,
    timeout: Option<Duration>,
    on_line: &mut dyn FnMut(&str),
) -> Result<StreamExit, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = spawn(&mut cmd)?;
    let (tx, rx) = mpsc::channel::<String>();
    if let Some(out) = child.stdout.take() {
        forward_lines(out, tx.clone());
    }
    if let Some(err) = child.stderr.take() {
        forward_lines(err, tx.clone());
    }
    drop(tx);

    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let received = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                rx.recv_timeout(remaining)
            }
            None => rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(line) => on_line(&line),
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(StreamExit {
                    status: None,
                    timed_out: true,
                });
            }
        }
    }
    let status = child
        .wait()
        .map_err(|e| ProcessError::Message(format!("{label} wait failed: {e}")))?;
    Ok(StreamExit {
        status: Some(status),
        timed_out: false,
    })
}
