//! Restart backoff schedule and retry accounting.

use std::time::Duration;

/// Fixed ascending delay table with a retry cap.
///
/// `delay(n)` looks up the n-th delay, clamping to the last table entry, and
/// returns `None` once the cap is reached — at that point the supervisor must
/// stop restarting and surface a fatal state instead.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    table: Vec<Duration>,
    cap: u32,
}

impl BackoffPolicy {
    pub fn new(table: Vec<Duration>, cap: u32) -> Self {
        Self { table, cap }
    }

    /// Delay before the restart attempt following `retry_count` consecutive
    /// failures, or `None` when the cap says give up.
    pub fn delay(&self, retry_count: u32) -> Option<Duration> {
        if retry_count >= self.cap {
            return None;
        }
        let idx = (retry_count as usize).min(self.table.len().saturating_sub(1));
        Some(self.table.get(idx).copied().unwrap_or(Duration::ZERO))
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            table: [2, 4, 8, 16, 32]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            cap: 5,
        }
    }
}

/// Consecutive restart-failure counter.
///
/// Reset to zero by any successful heartbeat: a live, responsive worker
/// cancels all accumulated backoff memory.
#[derive(Debug, Default)]
pub struct RetryCounter {
    count: u32,
}

impl RetryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn record_failure(&mut self) {
        self.count += 1;
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}
