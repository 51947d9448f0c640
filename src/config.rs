//! Supervisor configuration.

use std::time::Duration;

use crate::supervisor::backoff::BackoffPolicy;

/// Environment variables forwarded to the worker by default.
///
/// The worker is spawned with a cleared environment; only these (plus any
/// configured extras) are passed through, so ambient secrets in the host
/// process never leak into the child.
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "TMPDIR"];

/// Configuration for a [`Sidecar`](crate::Sidecar) instance.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Worker command line: program followed by its arguments.
    pub command: Vec<String>,
    /// Environment variables forwarded to the worker.
    pub env_allowlist: Vec<String>,
    /// Period between liveness probes while the worker is ready.
    pub heartbeat_interval: Duration,
    /// Deadline for a single liveness probe.
    pub heartbeat_timeout: Duration,
    /// Consecutive failed probes before the worker is forcibly killed.
    pub heartbeat_misses: u32,
    /// Restart delay schedule and retry cap.
    pub backoff: BackoffPolicy,
    /// Timeout applied to internally issued calls (the post-ready
    /// capability probe).
    pub probe_timeout: Duration,
}

impl SidecarConfig {
    /// Build a config for the given worker command line with default tuning.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            env_allowlist: DEFAULT_ENV_ALLOWLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(5),
            heartbeat_misses: 3,
            backoff: BackoffPolicy::default(),
            probe_timeout: Duration::from_secs(10),
        }
    }
}
