//! Worker lifecycle states.

use std::fmt;

/// Lifecycle of the current worker generation.
///
/// `Starting`: process spawned, readiness announcement not yet seen.
/// `Ready`: readiness observed, heartbeat active.
/// `Degraded`: at least one heartbeat probe failed; not yet restarted.
/// `Dead`: process confirmed gone (exited, killed, spawn failed, or stopped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Ready,
    Degraded,
    Dead,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::Degraded => "degraded",
            LifecycleState::Dead => "dead",
        };
        f.write_str(name)
    }
}
