//! Request correlation: matching inbound messages to pending calls.
//!
//! Each outbound call gets a monotonically increasing id and a table entry
//! holding its reply channel. The table is exclusively owned by the
//! supervisor actor; nothing outside it ever touches an entry, so exactly-once
//! resolution falls out of the structure — the `oneshot::Sender` is consumed
//! the first time an entry resolves, and a second resolution attempt finds no
//! entry at all.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{SidecarError, SidecarResult};

/// One outstanding request awaiting a terminal response.
pub struct PendingCall {
    /// Logical name of the call (its request type), for timeout errors.
    name: String,
    /// Consumed on terminal delivery, timeout, or mass failure.
    reply: oneshot::Sender<SidecarResult<Value>>,
    /// Present for streaming calls; chunks flow here, in order, before the
    /// terminal delivery.
    chunks: Option<mpsc::UnboundedSender<String>>,
}

/// Map of request id to pending call, plus the id allocator.
///
/// The id counter never resets, so ids stay unique across worker generations
/// and a stale response can never be mistaken for a live call.
#[derive(Default)]
pub struct CorrelationTable {
    next_id: i64,
    entries: HashMap<i64, PendingCall>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            // Id 0 is reserved for the readiness announcement.
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    /// Register a new pending call and return its id.
    pub fn insert(
        &mut self,
        name: String,
        reply: oneshot::Sender<SidecarResult<Value>>,
        chunks: Option<mpsc::UnboundedSender<String>>,
    ) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            PendingCall {
                name,
                reply,
                chunks,
            },
        );
        id
    }

    /// Deliver a terminal outcome; removes the entry. Returns `false` for an
    /// unknown id (already timed out, or from a previous generation).
    pub fn complete(&mut self, id: i64, outcome: SidecarResult<Value>) -> bool {
        match self.entries.remove(&id) {
            Some(call) => {
                // Receiver may have given up; that's fine.
                let _ = call.reply.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Deliver a streaming chunk; the entry stays pending.
    pub fn deliver_chunk(&mut self, id: i64, chunk: String) {
        match self.entries.get(&id) {
            Some(PendingCall {
                chunks: Some(sink), ..
            }) => {
                let _ = sink.send(chunk);
            }
            Some(_) => {
                log::debug!(
                    target: "sidecar_host::supervisor",
                    "[CORR] Dropping chunk for non-streaming call id={}",
                    id
                );
            }
            None => {
                log::debug!(
                    target: "sidecar_host::supervisor",
                    "[CORR] Dropping chunk for unknown id={}",
                    id
                );
            }
        }
    }

    /// Fail one call with its timeout error. Returns the call's name when an
    /// entry was actually removed; a late firing for a resolved id is a no-op.
    pub fn fail_timeout(&mut self, id: i64) -> Option<String> {
        let call = self.entries.remove(&id)?;
        let name = call.name.clone();
        let _ = call.reply.send(Err(SidecarError::timeout(&name)));
        Some(name)
    }

    /// Fail one call with the given error.
    pub fn fail(&mut self, id: i64, err: SidecarError) -> bool {
        match self.entries.remove(&id) {
            Some(call) => {
                let _ = call.reply.send(Err(err));
                true
            }
            None => false,
        }
    }

    /// Synchronously fail every pending call and clear the table.
    ///
    /// Dropping each entry also drops its chunk sink, so streaming callers
    /// observe end-of-chunks before the failure.
    pub fn fail_all(&mut self, err: &SidecarError) {
        if self.entries.is_empty() {
            return;
        }
        log::warn!(
            target: "sidecar_host::supervisor",
            "[CORR] Failing {} pending call(s): {}",
            self.entries.len(),
            err
        );
        for (_, call) in self.entries.drain() {
            let _ = call.reply.send(Err(err.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(table: &mut CorrelationTable, name: &str) -> (i64, oneshot::Receiver<SidecarResult<Value>>) {
        let (tx, rx) = oneshot::channel();
        let id = table.insert(name.to_string(), tx, None);
        (id, rx)
    }

    #[test]
    fn ids_are_monotonic_and_start_after_ready_id() {
        let mut table = CorrelationTable::new();
        let (first, _rx1) = single(&mut table, "a");
        let (second, _rx2) = single(&mut table, "b");
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn complete_resolves_the_matching_caller() {
        let mut table = CorrelationTable::new();
        let (id, rx) = single(&mut table, "ping");
        assert!(table.complete(id, Ok(json!({"status": "ok"}))));
        assert!(table.is_empty());
        let reply = tokio_test::block_on(rx).unwrap();
        assert_eq!(reply.unwrap()["status"], "ok");
    }

    #[test]
    fn complete_unknown_id_is_a_noop() {
        let mut table = CorrelationTable::new();
        assert!(!table.complete(42, Ok(json!(null))));
    }

    #[tokio::test]
    async fn timeout_then_late_terminal_resolves_exactly_once() {
        // P1: a terminal message after the timeout already fired is a no-op.
        let mut table = CorrelationTable::new();
        let (id, rx) = single(&mut table, "priorities");
        assert_eq!(table.fail_timeout(id), Some("priorities".to_string()));
        assert!(!table.complete(id, Ok(json!(1))), "late terminal must find no entry");
        match rx.await.unwrap() {
            Err(SidecarError::Timeout { name }) => assert_eq!(name, "priorities"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn late_timeout_after_resolution_is_a_noop() {
        let mut table = CorrelationTable::new();
        let (id, _rx) = single(&mut table, "ping");
        assert!(table.complete(id, Ok(json!(null))));
        assert_eq!(table.fail_timeout(id), None);
    }

    #[tokio::test]
    async fn chunks_arrive_in_order_before_terminal() {
        let mut table = CorrelationTable::new();
        let (reply_tx, reply_rx) = oneshot::channel();
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
        let id = table.insert("generate_stream".to_string(), reply_tx, Some(chunk_tx));

        table.deliver_chunk(id, "Hel".to_string());
        table.deliver_chunk(id, "lo".to_string());
        assert!(table.complete(id, Ok(json!("Hello"))));

        assert_eq!(chunk_rx.recv().await.unwrap(), "Hel");
        assert_eq!(chunk_rx.recv().await.unwrap(), "lo");
        // Entry removal dropped the sink: end of chunks.
        assert!(chunk_rx.recv().await.is_none());
        assert_eq!(reply_rx.await.unwrap().unwrap(), "Hello");
    }

    #[test]
    fn chunk_for_single_call_is_dropped() {
        let mut table = CorrelationTable::new();
        let (id, _rx) = single(&mut table, "ping");
        // Must not panic or resolve the call.
        table.deliver_chunk(id, "stray".to_string());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn fail_all_rejects_every_pending_call_and_empties_the_table() {
        // P4: 3 single + 2 streaming, all reject with WorkerExited.
        let mut table = CorrelationTable::new();
        let mut single_rxs = Vec::new();
        for name in ["a", "b", "c"] {
            let (_, rx) = single(&mut table, name);
            single_rxs.push(rx);
        }
        let mut streaming_rxs = Vec::new();
        for name in ["s1", "s2"] {
            let (reply_tx, reply_rx) = oneshot::channel();
            let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
            table.insert(name.to_string(), reply_tx, Some(chunk_tx));
            streaming_rxs.push((reply_rx, chunk_rx));
        }
        assert_eq!(table.len(), 5);

        table.fail_all(&SidecarError::WorkerExited);
        assert!(table.is_empty());

        for rx in single_rxs {
            assert!(matches!(rx.await.unwrap(), Err(SidecarError::WorkerExited)));
        }
        for (reply_rx, mut chunk_rx) in streaming_rxs {
            assert!(matches!(reply_rx.await.unwrap(), Err(SidecarError::WorkerExited)));
            assert!(chunk_rx.recv().await.is_none());
        }
    }
}
