// Multi-Reasoner Bridge - Codex CLI Adapter
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Runs `codex exec` as a subprocess in a throwaway directory (no git repo
// to auto-scan), read-only sandbox, prompt on stdin. Hard wall-clock
// timeout: on expiry the whole process group is terminated.

use crate::backend::{Backend, BackendFailure, BackendId};
use crate::paths;
use crate::prompt::BackendFamily;
use crate::request::Depth;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_GRACE: Duration = Duration::from_millis(1000);

pub struct CodexBackend {
    binary: String,
}

impl CodexBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn missing(&self) -> BackendFailure {
        BackendFailure::DependencyMissing {
            what: format!("Codex CLI '{}'", self.binary),
            hint: "Install the Codex CLI (npm install -g @openai/codex or brew install codex), run `codex login`, or point CODEX_BIN at the executable.".to_string(),
        }
    }
}

/// Arguments for a reasoning-only, non-interactive run reading the prompt from stdin
pub fn codex_args(depth: Depth) -> Vec<String> {
    vec![
        "exec".to_string(),
        "--skip-git-repo-check".to_string(),
        "-c".to_string(),
        format!("model_reasoning_effort=\"{}\"", depth.as_str()),
        "-s".to_string(),
        "read-only".to_string(),
        "--color".to_string(),
        "never".to_string(),
        "-".to_string(),
    ]
}

/// Strip CLI chatter: the answer starts after the last `codex` / `thinking`
/// marker line and stops before the `tokens used` footer.
/// Without any marker the whole output is taken.
pub fn clean_output(stdout: &str) -> String {
    let lines: Vec<&str> = stdout.lines().collect();
    let mut start: Option<usize> = None;
    let mut end = lines.len();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed == "codex" || trimmed == "thinking" {
            start = Some(i + 1);
        } else if start.is_some() && line.starts_with("tokens used") {
            end = i;
            break;
        }
    }

    match start {
        Some(s) if s <= end => lines[s..end].join("\n").trim().to_string(),
        Some(_) => String::new(),
        None => stdout.trim().to_string(),
    }
}

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Spawn, feed stdin, drain pipes, and enforce the deadline.
fn run_with_timeout(
    exe: &Path,
    args: &[String],
    cwd: &Path,
    input: &str,
    timeout: Duration,
) -> Result<Captured, BackendFailure> {
    let mut cmd = Command::new(exe);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group so a timeout can take down the whole tree
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            BackendFailure::DependencyMissing {
                what: format!("executable {:?}", exe),
                hint: "Check that CODEX_BIN points at an installed Codex CLI.".to_string(),
            }
        } else {
            BackendFailure::Backend(format!("failed to start codex: {}", e))
        }
    })?;

    let deadline = Instant::now() + timeout;
    let timed_out = || BackendFailure::Timeout { secs: timeout.as_secs() };

    // Writer and readers run beside the wait loop so full pipes never deadlock.
    // They own their pipes: anything still holding a pipe after the deadline
    // is abandoned, never waited on.
    if let Some(mut pipe) = child.stdin.take() {
        let input = input.to_owned();
        std::thread::spawn(move || {
            if let Err(e) = pipe.write_all(input.as_bytes()) {
                log::debug!("codex stdin closed after partial prompt: {}", e);
            }
        });
    }
    let stdout = spawn_drain(child.stdout.take());
    let stderr = spawn_drain(child.stderr.take());

    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => return Err(timed_out()),
        Err(e) => return Err(BackendFailure::Backend(format!("failed waiting on codex: {}", e))),
    };

    // Helpers left running in the group would otherwise keep the pipes open
    kill_leftovers(&child);

    let stdout = collect(&stdout, deadline).ok_or_else(|| {
        log::warn!("codex output still open at the deadline, abandoning it");
        timed_out()
    })?;
    let stderr = collect(&stderr, deadline).unwrap_or_default();
    Ok(Captured { status, stdout, stderr })
}

fn spawn_drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Drained bytes, or None if the pipe is still open when the deadline passes
fn collect(rx: &Receiver<Vec<u8>>, deadline: Instant) -> Option<Vec<u8>> {
    let remaining = deadline.saturating_duration_since(Instant::now()).max(POLL_INTERVAL);
    match rx.recv_timeout(remaining) {
        Ok(buf) => Some(buf),
        Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

/// Poll until exit or deadline. On deadline the process tree is killed and Ok(None) returned.
fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) if Instant::now() >= deadline => {
                log::warn!("codex (pid={}) exceeded its deadline, terminating", child.id());
                kill_process_tree(child);
                return Ok(None);
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill_process_tree(child);
                return Err(e);
            }
        }
    }
}

/// SIGTERM the group, give it a moment, then SIGKILL whatever is left.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(-pid, libc::SIGTERM);
    }
    let grace_end = Instant::now() + KILL_GRACE;
    while Instant::now() < grace_end {
        if let Ok(Some(_)) = child.try_wait() {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    unsafe {
        libc::killpg(pid, libc::SIGKILL);
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// SIGKILL whatever is still in the exited child's process group
#[cfg(unix)]
fn kill_leftovers(child: &Child) {
    unsafe {
        libc::killpg(child.id() as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_leftovers(_child: &Child) {}

impl Backend for CodexBackend {
    fn id(&self) -> BackendId {
        BackendId::Chatgpt
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Cli
    }

    fn preflight(&self) -> Result<(), BackendFailure> {
        paths::find_executable(&self.binary)
            .map(|_| ())
            .ok_or_else(|| self.missing())
    }

    fn call(&self, prompt: &str, depth: Depth, timeout: Duration) -> Result<String, BackendFailure> {
        // Checked per call: PATH lookup is cheap and tolerates late installs
        let exe = paths::find_executable(&self.binary).ok_or_else(|| self.missing())?;
        let workdir = paths::scratch_dir()
            .map_err(|e| BackendFailure::Backend(format!("cannot create scratch directory: {}", e)))?;

        let captured = run_with_timeout(&exe, &codex_args(depth), workdir.path(), prompt, timeout)?;

        if !captured.status.success() {
            let stderr = String::from_utf8_lossy(&captured.stderr).trim().to_string();
            return Err(BackendFailure::Backend(if stderr.is_empty() {
                match captured.status.code() {
                    Some(code) => format!("codex exited with code {}", code),
                    None => "codex was terminated by a signal".to_string(),
                }
            } else {
                stderr
            }));
        }

        let stdout = String::from_utf8(captured.stdout)
            .map_err(|_| BackendFailure::Malformed("codex output is not valid UTF-8".to_string()))?;
        let answer = clean_output(&stdout);
        if answer.is_empty() {
            return Err(BackendFailure::Malformed("codex produced no answer text".to_string()));
        }
        Ok(answer)
    }
}

// ============================================================================
// TESTS
// ============================================================================
