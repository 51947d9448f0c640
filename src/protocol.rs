//! Wire protocol shared with the worker process.
//!
//! The transport is newline-delimited UTF-8 text, one JSON object per line:
//!
//! - supervisor → worker: `{"id": <int>, "type": <string>, "payload": <object>}`
//! - worker → supervisor: `{"id": <int>, "result": <any>}` or
//!   `{"id": <int>, "error": <string>}`, optionally preceded by any number of
//!   `{"id": <int>, "chunk": <string>}` messages for streaming calls.
//! - readiness: the reserved id `0` with `{"result": {"status": "ready"}}`.

pub mod framing;
pub mod router;

use serde::Serialize;
use serde_json::Value;

/// Reserved id used by the worker's readiness announcement. Regular request
/// ids start at 1 and never collide with it.
pub const READY_ID: i64 = 0;

/// Request type of the periodic liveness probe.
pub const PING: &str = "ping";

/// Request type of the one-time post-ready capability probe. The worker
/// answers `{"ok": bool, "missing": [<package>, ...]}`.
pub const CHECK_IMPORTS: &str = "check_imports";

/// One outbound request, serialized as a single line.
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub id: i64,
    #[serde(rename = "type")]
    pub request_type: &'a str,
    pub payload: &'a Value,
}

impl<'a> Request<'a> {
    pub fn new(id: i64, request_type: &'a str, payload: &'a Value) -> Self {
        Self {
            id,
            request_type,
            payload,
        }
    }

    /// Serialize to the wire line (without the trailing newline).
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_type_field() {
        let payload = json!({"text": "hello"});
        let line = Request::new(7, "intent", &payload).encode().unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["type"], "intent");
        assert_eq!(parsed["payload"]["text"], "hello");
    }

    #[test]
    fn encoded_request_is_a_single_line() {
        let payload = json!({"prompt": "line one\nline two"});
        let line = Request::new(1, "generate", &payload).encode().unwrap();
        // Embedded newlines must be escaped, never literal, or framing breaks.
        assert!(!line.contains('\n'));
    }
}
