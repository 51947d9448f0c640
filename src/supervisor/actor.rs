//! The supervisor actor: single owner of all mutable supervisor state.
//!
//! The run loop multiplexes four inputs: commands from handles (and from
//! helper tasks posting timeout/heartbeat outcomes back), routed messages
//! from the worker's reader task, the restart timer, and the heartbeat timer.
//! Nothing in the loop blocks: I/O lives in the worker's background tasks,
//! and per-call timers are small spawned sleeps that post a command when they
//! fire (a firing for an already-resolved id finds no table entry and is a
//! no-op, which is what makes exactly-once resolution structural).

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::backoff::RetryCounter;
use super::correlation::CorrelationTable;
use super::heartbeat::{HeartbeatMonitor, ProbeVerdict};
use super::lifecycle::LifecycleState;
use super::SidecarEvent;
use crate::config::SidecarConfig;
use crate::error::{SidecarError, SidecarResult};
use crate::protocol::{self, Request};
use crate::protocol::router::Routed;
use crate::worker::{WorkerProcess, WorkerSignal};

/// Commands processed by the actor.
pub(super) enum Command {
    Start {
        reply: oneshot::Sender<SidecarResult<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Call {
        name: String,
        payload: Value,
        timeout: Duration,
        chunks: Option<mpsc::UnboundedSender<String>>,
        reply: oneshot::Sender<SidecarResult<Value>>,
    },
    /// A per-call timeout sleep elapsed.
    TimeoutFired { id: i64 },
    /// A heartbeat probe resolved (success or any failure).
    HeartbeatResult { ok: bool },
}

pub(super) struct Actor {
    config: SidecarConfig,
    commands: mpsc::Receiver<Command>,
    /// Handed to helper tasks (timeouts, heartbeat waiters) so their outcomes
    /// re-enter the single-owner loop as commands.
    command_tx: mpsc::Sender<Command>,
    events: mpsc::UnboundedSender<SidecarEvent>,

    state: LifecycleState,
    table: CorrelationTable,
    retries: RetryCounter,
    heartbeat: HeartbeatMonitor,

    worker: Option<WorkerProcess>,
    signals: Option<mpsc::UnboundedReceiver<WorkerSignal>>,

    /// Deadline of the scheduled restart, when in backoff.
    restart_at: Option<Instant>,
    /// Deadline of the next heartbeat probe; `None` while one is in flight
    /// or the worker is not ready.
    heartbeat_at: Option<Instant>,
    /// Set when automatic restarts are allowed (between `start` and `stop`
    /// or a fatal give-up).
    auto_restart: bool,
    /// A fatal notification has been emitted; guards exactly-once.
    fatal: bool,
}

impl Actor {
    pub(super) fn new(
        config: SidecarConfig,
        commands: mpsc::Receiver<Command>,
        command_tx: mpsc::Sender<Command>,
        events: mpsc::UnboundedSender<SidecarEvent>,
    ) -> Self {
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_misses);
        Self {
            config,
            commands,
            command_tx,
            events,
            state: LifecycleState::Dead,
            table: CorrelationTable::new(),
            retries: RetryCounter::new(),
            heartbeat,
            worker: None,
            signals: None,
            restart_at: None,
            heartbeat_at: None,
            auto_restart: false,
            fatal: false,
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    // Every handle dropped: shut down.
                    None => break,
                },
                signal = recv_opt(&mut self.signals) => match signal {
                    Some(WorkerSignal::Message(routed)) => self.handle_routed(routed),
                    Some(WorkerSignal::Exited(code)) => self.handle_exit(code),
                    None => self.signals = None,
                },
                _ = sleep_opt(self.restart_at) => {
                    self.restart_at = None;
                    // A spawn failure here is terminal and already reported
                    // through the fatal event.
                    let _ = self.spawn_worker();
                }
                _ = sleep_opt(self.heartbeat_at) => {
                    self.heartbeat_at = None;
                    self.send_heartbeat();
                }
            }
        }
        // Kill the worker and resolve anything still pending.
        self.worker = None;
        self.table.fail_all(&SidecarError::Closed);
        log::debug!(target: "sidecar_host::supervisor", "[ACTOR] Shut down");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { reply } => {
                let result = self.handle_start();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.handle_stop();
                let _ = reply.send(());
            }
            Command::Call {
                name,
                payload,
                timeout,
                chunks,
                reply,
            } => self.issue_call(name, payload, timeout, chunks, reply),
            Command::TimeoutFired { id } => {
                if let Some(name) = self.table.fail_timeout(id) {
                    log::warn!(
                        target: "sidecar_host::supervisor",
                        "[ACTOR] Request '{}' (id={}) timed out",
                        name,
                        id
                    );
                }
            }
            Command::HeartbeatResult { ok } => self.handle_heartbeat_result(ok),
        }
    }

    fn handle_start(&mut self) -> SidecarResult<()> {
        if self.worker.is_some() || self.restart_at.is_some() {
            return Ok(());
        }
        // Explicit external trigger: accumulated backoff memory is forgiven.
        self.retries.reset();
        self.fatal = false;
        self.auto_restart = true;
        self.spawn_worker()
    }

    fn handle_stop(&mut self) {
        log::info!(target: "sidecar_host::supervisor", "[ACTOR] Stop requested");
        self.auto_restart = false;
        self.restart_at = None;
        self.enter_dead();
    }

    /// Spawn a fresh worker generation.
    fn spawn_worker(&mut self) -> SidecarResult<()> {
        self.set_state(LifecycleState::Starting);
        match WorkerProcess::spawn(&self.config) {
            Ok((worker, signals)) => {
                self.worker = Some(worker);
                self.signals = Some(signals);
                self.heartbeat.reset();
                Ok(())
            }
            Err(err) => {
                // Executable missing or not runnable: non-retryable.
                log::error!(
                    target: "sidecar_host::supervisor",
                    "[ACTOR] Worker spawn failed: {}",
                    err
                );
                self.enter_dead();
                self.auto_restart = false;
                self.emit_fatal(err.to_string());
                Err(err)
            }
        }
    }

    /// Common transition into `Dead`: flush every pending call, stop the
    /// heartbeat, and discard the worker generation (dropping the handle
    /// kills the process if it is still running).
    fn enter_dead(&mut self) {
        self.table.fail_all(&SidecarError::WorkerExited);
        self.heartbeat_at = None;
        self.heartbeat.reset();
        self.worker = None;
        self.signals = None;
        self.set_state(LifecycleState::Dead);
    }

    /// OS-level exit observed (natural death or our own kill).
    fn handle_exit(&mut self, code: Option<i32>) {
        log::warn!(
            target: "sidecar_host::supervisor",
            "[ACTOR] Worker exited (code={:?}) in state {}",
            code,
            self.state
        );
        self.enter_dead();

        if !self.auto_restart || self.fatal {
            return;
        }
        match self.config.backoff.delay(self.retries.count()) {
            Some(delay) => {
                self.retries.record_failure();
                log::info!(
                    target: "sidecar_host::supervisor",
                    "[ACTOR] Restart {} scheduled in {:?}",
                    self.retries.count(),
                    delay
                );
                self.restart_at = Some(Instant::now() + delay);
            }
            None => {
                self.auto_restart = false;
                self.emit_fatal(format!(
                    "worker failed {} consecutive times; giving up",
                    self.config.backoff.cap()
                ));
            }
        }
    }

    fn handle_routed(&mut self, routed: Routed) {
        match routed {
            Routed::Ready => {
                if self.state != LifecycleState::Starting {
                    log::debug!(
                        target: "sidecar_host::supervisor",
                        "[ACTOR] Ignoring ready signal in state {}",
                        self.state
                    );
                    return;
                }
                log::info!(target: "sidecar_host::supervisor", "[ACTOR] Worker is ready");
                self.set_state(LifecycleState::Ready);
                self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);
                self.dispatch_capability_probe();
            }
            Routed::Chunk { id, chunk } => self.table.deliver_chunk(id, chunk),
            Routed::Terminal { id, outcome } => {
                if !self.table.complete(id, outcome) {
                    // Already timed out, or a previous generation's response.
                    log::debug!(
                        target: "sidecar_host::supervisor",
                        "[ACTOR] Dropping response for unknown id={}",
                        id
                    );
                }
            }
            Routed::Ignored => {}
        }
    }

    /// Register a pending call, write the request line, and arm its timeout.
    fn issue_call(
        &mut self,
        name: String,
        payload: Value,
        timeout: Duration,
        chunks: Option<mpsc::UnboundedSender<String>>,
        reply: oneshot::Sender<SidecarResult<Value>>,
    ) {
        let Some(worker) = &self.worker else {
            let _ = reply.send(Err(SidecarError::WorkerExited));
            return;
        };

        let id = self.table.insert(name.clone(), reply, chunks);
        let line = match Request::new(id, &name, &payload).encode() {
            Ok(line) => line,
            Err(e) => {
                self.table
                    .fail(id, SidecarError::internal(format!("encode failed: {}", e)));
                return;
            }
        };
        if !worker.write_line(line) {
            // Stdin is gone; the exit signal is on its way.
            self.table.fail(id, SidecarError::WorkerExited);
            return;
        }
        log::debug!(
            target: "sidecar_host::supervisor",
            "[ACTOR] Sent request '{}' id={}",
            name,
            id
        );

        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = command_tx.send(Command::TimeoutFired { id }).await;
        });
    }

    /// Issue the periodic `ping` through the correlator like any other call;
    /// a helper task posts the outcome back as a command.
    fn send_heartbeat(&mut self) {
        if self.worker.is_none() {
            return;
        }
        let (tx, rx) = oneshot::channel();
        self.issue_call(
            protocol::PING.to_string(),
            json!({}),
            self.config.heartbeat_timeout,
            None,
            tx,
        );
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let ok = matches!(rx.await, Ok(Ok(_)));
            let _ = command_tx.send(Command::HeartbeatResult { ok }).await;
        });
    }

    fn handle_heartbeat_result(&mut self, ok: bool) {
        if self.worker.is_none() {
            // The generation this probe belonged to is already gone.
            return;
        }
        match self.heartbeat.record(ok) {
            ProbeVerdict::Healthy => {
                // Confirmed health cancels accumulated backoff memory.
                self.retries.reset();
                if self.state == LifecycleState::Degraded {
                    self.set_state(LifecycleState::Ready);
                }
                self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);
            }
            ProbeVerdict::Degraded => {
                log::warn!(
                    target: "sidecar_host::supervisor",
                    "[ACTOR] Heartbeat miss {}/{}",
                    self.heartbeat.misses(),
                    self.config.heartbeat_misses
                );
                if self.state == LifecycleState::Ready {
                    self.set_state(LifecycleState::Degraded);
                }
                self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);
            }
            ProbeVerdict::Exhausted => {
                // Alive per the OS, but wedged: force the exit path.
                log::warn!(
                    target: "sidecar_host::supervisor",
                    "[ACTOR] Heartbeat exhausted; killing worker"
                );
                if let Some(worker) = &self.worker {
                    worker.kill();
                }
            }
        }
    }

    /// One-time post-ready capability check. Advisory: missing worker
    /// dependencies are logged, nothing else changes.
    fn dispatch_capability_probe(&mut self) {
        let (tx, rx) = oneshot::channel();
        self.issue_call(
            protocol::CHECK_IMPORTS.to_string(),
            json!({}),
            self.config.probe_timeout,
            None,
            tx,
        );
        tokio::spawn(async move {
            match rx.await {
                Ok(Ok(report)) => {
                    let ok = report.get("ok").and_then(Value::as_bool).unwrap_or(true);
                    if ok {
                        log::debug!(
                            target: "sidecar_host::supervisor",
                            "[ACTOR] Capability probe passed"
                        );
                    } else {
                        log::warn!(
                            target: "sidecar_host::supervisor",
                            "[ACTOR] Worker reports missing dependencies: {}",
                            report.get("missing").cloned().unwrap_or(Value::Null)
                        );
                    }
                }
                Ok(Err(e)) => {
                    log::warn!(
                        target: "sidecar_host::supervisor",
                        "[ACTOR] Capability probe failed: {}",
                        e
                    );
                }
                Err(_) => {}
            }
        });
    }

    fn set_state(&mut self, state: LifecycleState) {
        if self.state == state {
            return;
        }
        log::info!(
            target: "sidecar_host::supervisor",
            "[ACTOR] State {} -> {} (retries={})",
            self.state,
            state,
            self.retries.count()
        );
        self.state = state;
        let _ = self.events.send(SidecarEvent::Status {
            state,
            retry_count: self.retries.count(),
        });
    }

    fn emit_fatal(&mut self, message: String) {
        if self.fatal {
            return;
        }
        self.fatal = true;
        log::error!(target: "sidecar_host::supervisor", "[ACTOR] Fatal: {}", message);
        let _ = self.events.send(SidecarEvent::Fatal { message });
    }
}

/// Receive from an optional channel; pending forever when there is none.
async fn recv_opt(
    signals: &mut Option<mpsc::UnboundedReceiver<WorkerSignal>>,
) -> Option<WorkerSignal> {
    match signals {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep until an optional deadline; pending forever when there is none.
async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
