//! Stderr ring buffer for script failure reports
//!
//! The stderr reader thread tees every line to the log and into a bounded
//! buffer. When the script exits non-zero, the buffer's tail is attached to
//! the `WorkerFailed` error.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Default maximum number of lines to buffer
pub const DEFAULT_MAX_LINES: usize = 500;

/// Default maximum total bytes to buffer (4KB)
pub const DEFAULT_MAX_BYTES: usize = 4 * 1024;

#[derive(Debug, Default)]
struct Lines {
    lines: VecDeque<String>,
    bytes: usize,
}

/// A thread-safe ring buffer for stderr lines
#[derive(Debug, Clone)]
pub struct StderrBuffer {
    inner: Arc<Mutex<Lines>>,
    max_lines: usize,
    max_bytes: usize,
}

impl Default for StderrBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES, DEFAULT_MAX_BYTES)
    }
}

impl StderrBuffer {
    pub fn new(max_lines: usize, max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Lines::default())),
            max_lines: max_lines.max(1),
            max_bytes,
        }
    }

    /// Add a line, evicting the oldest ones past either limit
    pub fn push_line(&self, line: String) {
        let mut inner = self.inner.lock();

        while inner.bytes + line.len() > self.max_bytes {
            match inner.lines.pop_front() {
                Some(old) => inner.bytes = inner.bytes.saturating_sub(old.len()),
                None => break,
            }
        }
        while inner.lines.len() >= self.max_lines {
            match inner.lines.pop_front() {
                Some(old) => inner.bytes = inner.bytes.saturating_sub(old.len()),
                None => break,
            }
        }

        inner.bytes += line.len();
        inner.lines.push_back(line);
    }

    pub fn contents(&self) -> String {
        let inner = self.inner.lock();
        inner.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    pub fn last_lines(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock();
        let skip = inner.lines.len().saturating_sub(n);
        inner.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lines.is_empty()
    }
}

/// Buffer plus the reader thread, so callers can wait for the final lines
#[derive(Debug)]
pub struct StderrCapture {
    pub buffer: StderrBuffer,
    join_handle: JoinHandle<()>,
}

impl StderrCapture {
    /// Wait up to `timeout` for the reader to hit EOF, then snapshot
    pub fn contents_after(&self, timeout: Duration) -> String {
        let start = Instant::now();
        while !self.join_handle.is_finished() && start.elapsed() < timeout {
            thread::sleep(Duration::from_millis(10));
        }
        self.buffer.contents()
    }
}

/// Spawn a thread that tees the script's stderr into the log and a buffer
pub fn spawn_stderr_reader<R: Read + Send + 'static>(stderr: R, script: String) -> StderrCapture {
    let buffer = StderrBuffer::default();
    let sink = buffer.clone();

    let join_handle = thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(line) => {
                    debug!(target: "script_stderr", script = %script, "{}", line);
                    sink.push_line(line);
                }
                Err(e) => {
                    warn!(target: "script_stderr", error = %e, "stderr read error");
                    break;
                }
            }
        }
    });

    StderrCapture {
        buffer,
        join_handle,
    }
}
