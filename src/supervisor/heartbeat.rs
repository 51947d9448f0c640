//! Liveness probe accounting.
//!
//! The heartbeat is what distinguishes "process alive but wedged" from
//! "process alive and working" — a supervisor that only watches for OS exit
//! would miss a hung worker entirely. The monitor itself only counts probe
//! outcomes; the actor turns `Exhausted` into a forced kill, after which
//! normal exit handling takes over.

/// Verdict after recording one probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Probe succeeded; worker is healthy.
    Healthy,
    /// Probe failed but the miss threshold has not been reached.
    Degraded,
    /// Miss threshold reached; the worker must be killed.
    Exhausted,
}

/// Tracks consecutive heartbeat misses against a kill threshold.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    misses: u32,
    threshold: u32,
}

impl HeartbeatMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            misses: 0,
            threshold: threshold.max(1),
        }
    }

    /// Record one probe outcome. A success clears all accumulated misses.
    pub fn record(&mut self, ok: bool) -> ProbeVerdict {
        if ok {
            self.misses = 0;
            return ProbeVerdict::Healthy;
        }
        self.misses += 1;
        if self.misses >= self.threshold {
            ProbeVerdict::Exhausted
        } else {
            ProbeVerdict::Degraded
        }
    }

    /// Forget accumulated misses (new worker generation).
    pub fn reset(&mut self) {
        self.misses = 0;
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }
}
