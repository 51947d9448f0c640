//! Line framing over the worker's byte stream.
//!
//! The worker writes one JSON object per line, but reads from the pipe arrive
//! in arbitrary chunks: a read may carry half a line, several lines, or a line
//! boundary split anywhere. `LineFramer` accumulates the partial tail across
//! reads and emits only complete lines.
//!
//! A line that fails to parse is logged and dropped; one bad line must never
//! destabilize the stream or swallow the valid lines after it.

use serde_json::Value;

/// Accumulates raw byte chunks and yields complete parsed JSON lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    partial: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes; returns the messages completed by it.
    ///
    /// All fields produced by splitting on `\n` except the last are complete
    /// lines; the last becomes the new partial-line accumulator. Blank lines
    /// and unparseable lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        let mut data = std::mem::take(&mut self.partial);
        data.push_str(&String::from_utf8_lossy(chunk));

        let mut lines: Vec<&str> = data.split('\n').collect();
        // The final field may be an incomplete line; keep it for the next read.
        let tail = lines.pop().unwrap_or_default().to_string();

        let mut messages = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => messages.push(value),
                Err(e) => {
                    log::warn!(
                        target: "sidecar_host::protocol",
                        "[FRAMER] Dropping malformed line ({}): {}",
                        e,
                        truncate(line, 200)
                    );
                }
            }
        }

        self.partial = tail;
        messages
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
