//! The sidecar supervisor: public handle and event surface.
//!
//! All mutable supervisor state (the worker handle, the correlation table,
//! the lifecycle state, the retry counter) is owned by a single background
//! actor task; the cloneable [`Sidecar`] handle only sends it commands. That
//! single-owner shape serializes every mutation without locks while any
//! number of callers keep calls in flight concurrently.

mod actor;
pub mod backoff;
pub mod correlation;
pub mod heartbeat;
pub mod lifecycle;

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::config::SidecarConfig;
use crate::error::{SidecarError, SidecarResult};
use actor::{Actor, Command};
use lifecycle::LifecycleState;

/// Notifications emitted by the supervisor.
#[derive(Debug, Clone)]
pub enum SidecarEvent {
    /// Lifecycle state changed.
    Status {
        state: LifecycleState,
        retry_count: u32,
    },
    /// No further automatic recovery will occur: either the worker executable
    /// cannot be spawned at all, or the restart cap was exhausted. Must be
    /// surfaced to the end user.
    Fatal { message: String },
}

/// Cloneable handle to a running supervisor.
///
/// Exactly one worker instance is managed at a time, restarted in place.
/// Dropping every handle shuts the supervisor down: the actor kills the
/// worker and fails any remaining calls.
#[derive(Clone)]
pub struct Sidecar {
    commands: mpsc::Sender<Command>,
}

impl Sidecar {
    /// Create the supervisor and its actor task. The worker is not spawned
    /// until [`start`](Self::start) is called.
    pub fn new(config: SidecarConfig, events: mpsc::UnboundedSender<SidecarEvent>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let actor = Actor::new(config, command_rx, command_tx.clone(), events);
        tokio::spawn(actor.run());
        Self {
            commands: command_tx,
        }
    }

    /// Launch the worker. Idempotent while the worker is running or a restart
    /// is already scheduled. Called after a fatal stop, this is the explicit
    /// manual trigger that resets the retry counter and tries again.
    pub async fn start(&self) -> SidecarResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Start { reply: tx }).await?;
        rx.await.map_err(|_| SidecarError::Closed)?
    }

    /// Stop the worker and fail all pending calls. No restart is scheduled.
    pub async fn stop(&self) -> SidecarResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stop { reply: tx }).await?;
        rx.await.map_err(|_| SidecarError::Closed)
    }

    /// Issue a single-shot call and await its terminal response.
    ///
    /// On timeout the pending entry is removed and the caller fails, but the
    /// request is not retracted from the worker; a late response is dropped.
    pub async fn call(
        &self,
        request_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> SidecarResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Call {
            name: request_type.to_string(),
            payload,
            timeout,
            chunks: None,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| SidecarError::Closed)?
    }

    /// Issue a streaming call. Chunks arrive on the returned handle in order,
    /// strictly before the terminal result.
    pub async fn call_streaming(
        &self,
        request_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> SidecarResult<StreamingCall> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        self.send(Command::Call {
            name: request_type.to_string(),
            payload,
            timeout,
            chunks: Some(chunk_tx),
            reply: reply_tx,
        })
        .await?;
        Ok(StreamingCall {
            chunks: chunk_rx,
            reply: reply_rx,
        })
    }

    async fn send(&self, command: Command) -> SidecarResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SidecarError::Closed)
    }
}

/// One in-flight streaming call.
///
/// Read chunks with [`next_chunk`](Self::next_chunk) until it returns `None`
/// (the terminal response closes the chunk stream), then take the result with
/// [`finish`](Self::finish).
pub struct StreamingCall {
    chunks: mpsc::UnboundedReceiver<String>,
    reply: oneshot::Receiver<SidecarResult<Value>>,
}

impl StreamingCall {
    /// Next chunk, or `None` once the call has reached its terminal state.
    pub async fn next_chunk(&mut self) -> Option<String> {
        self.chunks.recv().await
    }

    /// Await the terminal result. Any undrained chunks are discarded.
    pub async fn finish(self) -> SidecarResult<Value> {
        self.reply.await.map_err(|_| SidecarError::Closed)?
    }
}
