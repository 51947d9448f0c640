//! Shared helpers for supervisor integration tests.

// These helpers are shared across multiple test binaries but not all tests
// use every helper. Allow dead_code to suppress per-binary warnings.
#![allow(dead_code)]

pub mod fake_worker;

use std::time::Duration;

use sidecar_host::{LifecycleState, SidecarEvent};
use tokio::sync::mpsc;

/// How long event assertions wait before giving up.
pub const EVENT_DEADLINE: Duration = Duration::from_secs(10);

/// Initialize logging once per test binary; honors `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Receive events until a status with the wanted state arrives.
/// Panics if the channel closes or the deadline passes first.
pub async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<SidecarEvent>,
    want: LifecycleState,
) -> u32 {
    let deadline = tokio::time::Instant::now() + EVENT_DEADLINE;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for state {}", want))
            .expect("event channel closed");
        match event {
            SidecarEvent::Status { state, retry_count } if state == want => return retry_count,
            _ => continue,
        }
    }
}

/// Receive events until a fatal notification arrives; returns its message.
pub async fn wait_for_fatal(events: &mut mpsc::UnboundedReceiver<SidecarEvent>) -> String {
    let deadline = tokio::time::Instant::now() + EVENT_DEADLINE;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("timed out waiting for fatal event")
            .expect("event channel closed");
        if let SidecarEvent::Fatal { message } = event {
            return message;
        }
    }
}

/// Drain whatever events are immediately available.
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<SidecarEvent>) -> Vec<SidecarEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
