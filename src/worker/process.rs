//! Child-process worker: the script speaks JSONL on stdin/stdout.
//!
//! The child is spawned in its own process group so that termination reaches
//! everything it forked. Three threads serve one child:
//! - reader: parses commands from stdout, then reaps the child
//! - writer: serialises payloads onto stdin
//! - stderr: tees stderr into the log and a ring buffer

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command as ProcessCommand, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender};
use tracing::{debug, error, info, instrument, warn};

use super::{spawn_stderr_reader, StderrCapture, Worker, WorkerEvent, WorkerSink};
use crate::error::{HostError, Result};
use crate::protocol::{write_line, Command, JsonlReader, Payload, SystemCommand};

/// How often the group is polled during the SIGTERM grace period
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for trailing stderr once the child has exited
const STDERR_SETTLE: Duration = Duration::from_millis(200);

#[cfg(unix)]
mod unix_process {
    use libc::{c_int, pid_t, ESRCH};

    /// Signal a whole process group. `Ok(false)` means the group is gone.
    pub fn signal_group(pgid: u32, signal: c_int) -> std::io::Result<bool> {
        // Safety: kill() has no memory-safety preconditions; negative pid targets the group
        let rc = unsafe { libc::kill(-(pgid as pid_t), signal) };
        if rc == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(ESRCH) {
            Ok(false)
        } else {
            Err(err)
        }
    }

    /// Signal 0 checks for existence; EPERM still means alive
    pub fn group_alive(pgid: u32) -> bool {
        // Safety: see signal_group
        let rc = unsafe { libc::kill(-(pgid as pid_t), 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(ESRCH)
    }

    pub const SIGTERM: c_int = libc::SIGTERM;
    pub const SIGKILL: c_int = libc::SIGKILL;
}

/// Where the script lives and how to launch it
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSpec {
    pub path: PathBuf,
    /// Explicit interpreter; inferred from the extension when absent
    pub interpreter: Option<String>,
    pub args: Vec<String>,
}

impl ScriptSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interpreter: None,
            args: Vec::new(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn resolved_interpreter(&self) -> Option<String> {
        self.interpreter
            .clone()
            .or_else(|| interpreter_for(&self.path).map(str::to_string))
    }
}

/// Interpreter implied by a script's extension; `None` means run it directly
pub fn interpreter_for(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("py") => Some("python3"),
        Some("js" | "mjs") => Some("node"),
        Some("ts") => Some("bun"),
        Some("sh") => Some("sh"),
        _ => None,
    }
}

/// Look in the usual install locations, then PATH
fn find_executable(name: &str) -> Option<PathBuf> {
    let candidates = [
        dirs::home_dir().map(|h| h.join(".bun/bin")),
        dirs::home_dir().map(|h| h.join(".volta/bin")),
        dirs::home_dir().map(|h| h.join(".local/bin")),
        Some(PathBuf::from("/opt/homebrew/bin")),
        Some(PathBuf::from("/usr/local/bin")),
        Some(PathBuf::from("/usr/bin")),
        Some(PathBuf::from("/bin")),
    ];

    let found = candidates
        .iter()
        .flatten()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
        .or_else(|| which::which(name).ok());
    debug!(name, found = ?found, "Executable lookup");
    found
}

/// Kill switch for a spawned process group.
///
/// Dropping the handle terminates the group, so it must outlive the script.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Also the PGID, since the child is spawned with `process_group(0)`
    pid: u32,
    grace: Duration,
    killed: bool,
}

impl ProcessHandle {
    pub fn new(pid: u32, grace: Duration) -> Self {
        Self {
            pid,
            grace,
            killed: false,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// SIGTERM the group, wait out the grace period, then SIGKILL. Idempotent.
    pub fn kill(&mut self) {
        if self.killed {
            debug!(pid = self.pid, "Process already killed");
            return;
        }
        self.killed = true;

        #[cfg(unix)]
        {
            use unix_process::{group_alive, signal_group, SIGKILL, SIGTERM};

            let pgid = self.pid;
            match signal_group(pgid, SIGTERM) {
                Ok(true) => debug!(pgid, "SIGTERM sent"),
                Ok(false) => {
                    debug!(pgid, "Process group already exited");
                    return;
                }
                Err(e) => warn!(pgid, error = %e, "SIGTERM failed, escalating"),
            }

            let start = Instant::now();
            while start.elapsed() < self.grace {
                if !group_alive(pgid) {
                    info!(pgid, "Process group exited after SIGTERM");
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }

            warn!(
                pgid,
                grace_ms = self.grace.as_millis() as u64,
                "Process group ignored SIGTERM, sending SIGKILL"
            );
            match signal_group(pgid, SIGKILL) {
                Ok(true) => info!(pgid, "Process group killed"),
                Ok(false) => debug!(pgid, "Process group exited just before SIGKILL"),
                Err(e) => error!(pgid, error = %e, "SIGKILL failed"),
            }
        }

        #[cfg(not(unix))]
        warn!(pid = self.pid, "Process group signals unsupported on this platform");
    }

    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        unix_process::group_alive(self.pid)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Worker running the script as a child process
pub struct ProcessWorker {
    spec: ScriptSpec,
    grace: Duration,
    stdin: Option<Sender<Payload>>,
    handle: Option<ProcessHandle>,
    terminated: Arc<AtomicBool>,
}

impl ProcessWorker {
    pub fn new(spec: ScriptSpec, grace: Duration) -> Self {
        Self {
            spec,
            grace,
            stdin: None,
            handle: None,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(ProcessHandle::pid)
    }

    fn build_command(&self) -> ProcessCommand {
        let mut command = match self.spec.resolved_interpreter() {
            Some(interpreter) => {
                let executable = find_executable(&interpreter)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or(interpreter);
                let mut command = ProcessCommand::new(executable);
                command.arg(&self.spec.path);
                command
            }
            None => ProcessCommand::new(&self.spec.path),
        };
        command
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // The child's pid becomes the pgid so the whole tree can be signalled
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
    }
}

impl Worker for ProcessWorker {
    #[instrument(skip_all, fields(script = %self.spec.path.display()))]
    fn start(&mut self, sink: WorkerSink) -> Result<()> {
        if self.handle.is_some() {
            return Err(HostError::WorkerSpawn("worker already started".to_string()));
        }
        if self.terminated.load(Ordering::SeqCst) {
            return Err(HostError::WorkerSpawn("worker was terminated".to_string()));
        }

        let mut child = self.build_command().spawn().map_err(|e| {
            error!(error = %e, "Script spawn failed");
            HostError::WorkerSpawn(format!("{}: {}", self.spec.path.display(), e))
        })?;

        let pid = child.id();
        info!(pid, pgid = pid, "Script process spawned");

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                return Err(HostError::WorkerSpawn(
                    "script stdio was not captured".to_string(),
                ));
            }
        };
        let stderr = child
            .stderr
            .take()
            .map(|s| spawn_stderr_reader(s, self.spec.path.display().to_string()));

        let (tx, rx) = async_channel::unbounded();
        spawn_stdin_writer(pid, stdin, rx);
        spawn_stdout_reader(pid, child, stdout, stderr, sink, self.terminated.clone());

        self.stdin = Some(tx);
        self.handle = Some(ProcessHandle::new(pid, self.grace));
        Ok(())
    }

    fn post(&mut self, payload: Payload) -> Result<()> {
        let stdin = self.stdin.as_ref().ok_or_else(|| HostError::WorkerFailed {
            message: "script is not running".to_string(),
            stderr: None,
        })?;
        stdin.try_send(payload).map_err(|_| HostError::WorkerFailed {
            message: "script stdin is closed".to_string(),
            stderr: None,
        })
    }

    fn terminate(&mut self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(script = %self.spec.path.display(), "Terminating script process");
        if let Some(stdin) = self.stdin.take() {
            stdin.close();
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.kill();
        }
    }

    fn describe(&self) -> String {
        format!("process:{}", self.spec.path.display())
    }
}

fn spawn_stdin_writer(pid: u32, mut stdin: ChildStdin, rx: Receiver<Payload>) {
    thread::spawn(move || {
        while let Ok(payload) = rx.recv_blocking() {
            debug!(pid, tag = payload.tag(), "Writing payload to script");
            if let Err(e) = write_line(&mut stdin, &payload) {
                warn!(pid, error = %e, "Script stdin write failed");
                break;
            }
        }
        debug!(pid, "Script stdin writer exiting");
        // dropping stdin sends EOF to the script
    });
}

fn spawn_stdout_reader(
    pid: u32,
    mut child: Child,
    stdout: ChildStdout,
    stderr: Option<StderrCapture>,
    sink: WorkerSink,
    terminated: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let mut reader = JsonlReader::new(BufReader::new(stdout));
        let mut declared_exit = None;

        loop {
            match reader.next_message_graceful::<Command>() {
                Ok(Some(command)) => {
                    if let Command::System(SystemCommand::Exit { code, .. }) = &command {
                        declared_exit = Some(*code);
                    }
                    if terminated.load(Ordering::SeqCst) {
                        continue;
                    }
                    sink(WorkerEvent::Command(command));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(pid, error = %e, "Script stdout read failed");
                    break;
                }
            }
        }

        let status = child.wait();
        if terminated.load(Ordering::SeqCst) {
            debug!(pid, "Script reaped after termination");
            return;
        }

        let event = match status {
            Ok(status) => match status.code() {
                Some(0) => WorkerEvent::Exited { code: 0 },
                Some(code) if declared_exit == Some(code) => {
                    WorkerEvent::Exited { code }
                }
                Some(code) => WorkerEvent::Failed {
                    message: format!("script exited with status {code}"),
                    stderr: stderr_tail(stderr.as_ref()),
                },
                None => WorkerEvent::Failed {
                    message: "script was killed by a signal".to_string(),
                    stderr: stderr_tail(stderr.as_ref()),
                },
            },
            Err(e) => WorkerEvent::Failed {
                message: format!("failed to wait for script: {e}"),
                stderr: None,
            },
        };
        info!(pid, event = ?event, "Script process finished");
        sink(event);
    });
}

fn stderr_tail(capture: Option<&StderrCapture>) -> Option<String> {
    capture
        .map(|c| c.contents_after(STDERR_SETTLE))
        .filter(|s| !s.is_empty())
}
