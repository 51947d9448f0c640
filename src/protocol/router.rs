//! Classification of inbound worker messages.
//!
//! Every parsed line is sorted into one of four shapes: the readiness
//! announcement, a streaming chunk, a terminal result/error, or noise. Noise
//! (unknown shapes, missing ids) is dropped without raising an error; a worker
//! bug must not crash the supervisor.

use serde_json::Value;

use super::READY_ID;
use crate::error::SidecarError;

/// Verdict for one inbound message.
#[derive(Debug)]
pub enum Routed {
    /// Readiness announcement on the reserved id.
    Ready,
    /// Non-terminal streaming chunk for a pending call.
    Chunk { id: i64, chunk: String },
    /// Terminal result or error for a pending call.
    Terminal {
        id: i64,
        outcome: Result<Value, SidecarError>,
    },
    /// Unrecognized shape; dropped.
    Ignored,
}

/// Classify one parsed message.
///
/// Policy decisions, stated explicitly rather than left to evaluation order:
/// - when a message carries both `result` and `error`, the error wins;
/// - `"error": null` counts as absent (the worker emits it on every
///   successful response);
/// - a `chunk` is only a chunk when neither `result` nor `error` is present.
pub fn route(message: &Value) -> Routed {
    let Some(id) = message.get("id").and_then(Value::as_i64) else {
        log::debug!(
            target: "sidecar_host::protocol",
            "[ROUTER] Dropping message without integer id"
        );
        return Routed::Ignored;
    };

    if id == READY_ID {
        let status = message
            .get("result")
            .and_then(|r| r.get("status"))
            .and_then(Value::as_str);
        if status == Some("ready") {
            return Routed::Ready;
        }
        log::debug!(
            target: "sidecar_host::protocol",
            "[ROUTER] Dropping non-ready message on reserved id"
        );
        return Routed::Ignored;
    }

    if let Some(message_err) = error_field(message) {
        return Routed::Terminal {
            id,
            outcome: Err(SidecarError::worker(message_err)),
        };
    }

    if let Some(result) = message.get("result") {
        return Routed::Terminal {
            id,
            outcome: Ok(result.clone()),
        };
    }

    if let Some(chunk) = message.get("chunk").and_then(Value::as_str) {
        return Routed::Chunk {
            id,
            chunk: chunk.to_string(),
        };
    }

    log::debug!(
        target: "sidecar_host::protocol",
        "[ROUTER] Dropping unroutable message for id={}",
        id
    );
    Routed::Ignored
}

/// Extract a non-null `error` field as a message string.
fn error_field(message: &Value) -> Option<String> {
    match message.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}
