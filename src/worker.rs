//! Worker process spawning and stream plumbing.
//!
//! One `WorkerProcess` is one generation of the worker. It is destroyed and
//! replaced wholesale on restart, never reused across a restart boundary.
//! Spawning wires up four background tasks:
//!
//! - a writer task owning stdin (requests are queued through a channel, so
//!   lines from concurrent callers are written whole, never interleaved);
//! - a reader task owning stdout (framer + router, forwarding routed messages
//!   to the supervisor actor);
//! - a stderr task that drains diagnostics into the log (stderr is opaque,
//!   never parsed for control flow);
//! - a wait task owning the `Child`, which reports the OS exit and performs
//!   the kill when asked.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SidecarConfig;
use crate::error::{SidecarError, SidecarResult};
use crate::protocol::framing::LineFramer;
use crate::protocol::router::{self, Routed};

/// Everything the worker's background tasks report to the supervisor actor.
#[derive(Debug)]
pub enum WorkerSignal {
    /// A routed inbound message from the worker's stdout.
    Message(Routed),
    /// The process is gone, with its exit code if the OS reported one.
    Exited(Option<i32>),
}

/// Handle to one live worker generation.
pub struct WorkerProcess {
    writer: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl WorkerProcess {
    /// Spawn the worker with a cleared, allow-listed environment and piped
    /// stdio. Returns the handle and the signal stream for this generation.
    pub fn spawn(
        config: &SidecarConfig,
    ) -> SidecarResult<(Self, mpsc::UnboundedReceiver<WorkerSignal>)> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| SidecarError::spawn("worker command is empty"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &config.env_allowlist {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SidecarError::spawn(format!("'{}': {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SidecarError::spawn("failed to capture worker stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SidecarError::spawn("failed to capture worker stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SidecarError::spawn("failed to capture worker stderr"))?;

        log::info!(
            target: "sidecar_host::worker",
            "[SPAWN] Worker '{}' started (pid={:?})",
            program,
            child.id()
        );

        let cancel = CancellationToken::new();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(stdin, writer_rx));
        tokio::spawn(read_loop(stdout, signal_tx.clone(), cancel.clone()));
        tokio::spawn(stderr_loop(stderr));
        tokio::spawn(wait_loop(child, signal_tx, cancel.clone()));

        Ok((
            Self {
                writer: writer_tx,
                cancel,
            },
            signal_rx,
        ))
    }

    /// Queue one request line for the worker's stdin. The newline is appended
    /// by the writer task. Returns `false` if stdin is already gone.
    pub fn write_line(&self, line: String) -> bool {
        self.writer.send(line).is_ok()
    }

    /// Forcibly terminate the process. The exit is reported through the
    /// signal stream like any other death.
    pub fn kill(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Writes queued request lines to the worker's stdin, one whole line at a
/// time. Exits when the queue closes (handle dropped) or stdin breaks.
async fn write_loop(mut stdin: ChildStdin, mut queue: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = queue.recv().await {
        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = write.await {
            log::warn!(
                target: "sidecar_host::worker",
                "[WRITER] Stdin write failed: {}",
                e
            );
            break;
        }
    }
    // Dropping stdin closes the pipe; a well-behaved worker exits on EOF.
}

/// Reads stdout chunks, frames and routes them, and forwards routed messages
/// to the actor in arrival order.
async fn read_loop(
    mut stdout: ChildStdout,
    signals: mpsc::UnboundedSender<WorkerSignal>,
    cancel: CancellationToken,
) {
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; 8192];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = stdout.read(&mut buf) => read,
        };
        let n = match read {
            Ok(0) => {
                log::debug!(target: "sidecar_host::worker", "[READER] Stdout EOF");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                log::warn!(
                    target: "sidecar_host::worker",
                    "[READER] Stdout read failed: {}",
                    e
                );
                break;
            }
        };
        for message in framer.push(&buf[..n]) {
            match router::route(&message) {
                Routed::Ignored => {}
                routed => {
                    if signals.send(WorkerSignal::Message(routed)).is_err() {
                        // Supervisor is gone; nothing left to deliver to.
                        return;
                    }
                }
            }
        }
    }
}

/// Drains stderr into the log, line by line.
async fn stderr_loop(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!(target: "sidecar_host::worker", "[STDERR] {}", line);
    }
}

/// Owns the `Child`: reports the natural exit, or kills on request and then
/// reports that exit. Either way exactly one `Exited` signal is sent.
async fn wait_loop(
    mut child: Child,
    signals: mpsc::UnboundedSender<WorkerSignal>,
    cancel: CancellationToken,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            log::info!(target: "sidecar_host::worker", "[WAIT] Killing worker");
            let _ = child.start_kill();
            child.wait().await
        }
    };
    let code = status.ok().and_then(|s| s.code());
    log::info!(
        target: "sidecar_host::worker",
        "[WAIT] Worker exited (code={:?})",
        code
    );
    let _ = signals.send(WorkerSignal::Exited(code));
}
