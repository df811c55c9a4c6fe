use crate::cancel::CancelToken;
use crate::RuntimeError;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TAIL_LINES: usize = 20;

/// Result of a streamed child process.
#[derive(Debug)]
pub(crate) struct Streamed {
    pub status: ExitStatus,
    /// Last lines the child wrote, stdout and stderr interleaved.
    pub tail: Vec<String>,
}

impl Streamed {
    pub fn failure_reason(&self) -> String {
        let mut reason = self.status.to_string();
        if !self.tail.is_empty() {
            reason.push_str(": ");
            reason.push_str(self.tail.join("\n").trim());
        }
        reason
    }
}

#[derive(Debug)]
pub(crate) enum RunError {
    Spawn(std::io::Error),
    Cancelled,
}

impl RunError {
    pub fn into_runtime(self, operation: &str) -> RuntimeError {
        match self {
            RunError::Spawn(e) => RuntimeError::Io(e),
            RunError::Cancelled => RuntimeError::Cancelled(operation.to_owned()),
        }
    }
}

/// Forward `reader` line by line, decoding lossily. The pipe is always
/// drained to EOF so the child never blocks or dies on a closed pipe.
fn forward_lines<R: Read + Send + 'static>(
    reader: R,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut forwarding = true;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("reading child output: {e}");
                    break;
                }
            }
            if !forwarding {
                continue;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']).to_owned();
            if tx.send(line).is_err() {
                forwarding = false;
            }
        }
    })
}

/// Run `cmd`, copying each output line to `out` as it arrives.
///
/// The cancel token is polled while the child runs; when it fires the child
/// is killed and reaped before `Cancelled` is returned.
pub(crate) fn run_streaming(
    cmd: &mut Command,
    out: &mut dyn Write,
    cancel: &CancelToken,
) -> Result<Streamed, RunError> {
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }

    debug!("exec: {cmd:?}");
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(RunError::Spawn)?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    let mut tail = VecDeque::with_capacity(TAIL_LINES);
    loop {
        if cancel.is_cancelled() {
            if let Err(e) = child.kill() {
                warn!("failed to kill cancelled child: {e}");
            }
            let _ = child.wait();
            for r in readers {
                let _ = r.join();
            }
            return Err(RunError::Cancelled);
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if let Err(e) = writeln!(out, "{line}") {
                    debug!("progress sink rejected output: {e}");
                }
                if tail.len() == TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    for r in readers {
        let _ = r.join();
    }
    let status = child.wait().map_err(RunError::Spawn)?;
    let _ = out.flush();

    Ok(Streamed {
        status,
        tail: tail.into_iter().collect(),
    })
}

/// Captured output of a short engine query.
#[derive(Debug)]
pub(crate) struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

pub(crate) fn run_capture(cmd: &mut Command) -> Result<Captured, RuntimeError> {
    debug!("exec: {cmd:?}");
    let output = cmd.stdin(Stdio::null()).output()?;
    Ok(Captured {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
