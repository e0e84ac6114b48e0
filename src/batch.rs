//! One RPC's worth of operations. A `WriteBatch` is a one-shot container:
//! `Open -> ReadyToSend -> Sent`, monotonic, no reuse.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::{SchedulerError, WriteError};
use crate::operation::{resolve_bulk, WriteOperation, WriteResult};
use crate::path::DocumentPath;
use crate::transport::Transport;
use crate::wire::{BatchWriteRequest, CommitRequest, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Open,
    ReadyToSend,
    Sent,
}

/// Which RPC `send` dispatches to.
pub enum SendMode {
    /// Non-atomic `batchWrite`; every index resolved independently.
    Bulk,
    /// Atomic `commit`; success/failure is uniform across every index,
    /// optionally scoped to a transaction.
    Commit { transaction: Option<Vec<u8>> },
}

pub(crate) struct WriteBatch {
    max_size: usize,
    database: String,
    state: BatchState,
    doc_paths: HashSet<DocumentPath>,
    operations: Vec<WriteOperation>,
    /// Documents this batch cannot be dispatched until some earlier,
    /// not-yet-completed batch containing them clears. Populated once, at
    /// append time (the intersection of this batch's docs with the
    /// scheduler's in-flight set at that moment), and drained one document
    /// at a time as conflicting batches complete — never recomputed from
    /// scratch.
    blocked_on: HashSet<DocumentPath>,
    completion_tx: Option<oneshot::Sender<()>>,
    completion_rx: Shared<oneshot::Receiver<()>>,
}

impl WriteBatch {
    pub fn new(max_size: usize, database: String) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            max_size,
            database,
            state: BatchState::Open,
            doc_paths: HashSet::new(),
            operations: Vec::new(),
            blocked_on: HashSet::new(),
            completion_tx: Some(tx),
            completion_rx: rx.shared(),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn contains(&self, path: &DocumentPath) -> bool {
        self.doc_paths.contains(path)
    }

    pub fn doc_paths(&self) -> &HashSet<DocumentPath> {
        &self.doc_paths
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocked_on.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// A clone of the shared completion future; resolves once this batch's
    /// results have been fully distributed.
    pub fn completion(&self) -> Shared<oneshot::Receiver<()>> {
        self.completion_rx.clone()
    }

    pub fn append(&mut self, op: WriteOperation) -> Result<(), SchedulerError> {
        if self.state != BatchState::Open {
            return Err(SchedulerError::AlreadyCommitted);
        }
        if self.doc_paths.contains(&op.document_path) {
            return Err(SchedulerError::DuplicateDocument(
                op.document_path.to_string(),
            ));
        }
        self.doc_paths.insert(op.document_path.clone());
        self.operations.push(op);
        if self.operations.len() >= self.max_size {
            self.state = BatchState::ReadyToSend;
        }
        Ok(())
    }

    /// Idempotent: `Open -> ReadyToSend`; no-op in any other state.
    pub fn mark_ready_to_send(&mut self) {
        if self.state == BatchState::Open {
            self.state = BatchState::ReadyToSend;
        }
    }

    pub fn block_on(&mut self, doc: DocumentPath) {
        self.blocked_on.insert(doc);
    }

    /// Called once a conflicting batch completes; clears this batch's block
    /// on that document, if it had one.
    pub fn unblock(&mut self, doc: &DocumentPath) {
        self.blocked_on.remove(doc);
    }

    /// Serializes every operation, dispatches exactly one RPC, and
    /// distributes results. Requires `state == ReadyToSend`; transitions to
    /// `Sent` immediately so the batch can never be resubmitted. Returns the
    /// document paths this batch held (for the caller to clear from its
    /// in-flight bookkeeping) alongside the per-operation results in append
    /// order, for callers (such as `CommitCoordinator::commit`) that need
    /// the ordered result set directly rather than through each operation's
    /// own `PendingWrite`.
    pub async fn send(
        mut self,
        transport: Arc<dyn Transport>,
        mode: SendMode,
    ) -> (Vec<DocumentPath>, Vec<Result<WriteResult, WriteError>>) {
        debug_assert_eq!(self.state, BatchState::ReadyToSend);
        self.state = BatchState::Sent;

        let doc_paths: Vec<DocumentPath> = self.doc_paths.iter().cloned().collect();
        let writes: Vec<Write> = self.operations.iter().map(|op| op.serialize()).collect();
        let n = self.operations.len();

        tracing::debug!(writes = n, mode = match mode {
            SendMode::Bulk => "batch_write",
            SendMode::Commit { .. } => "commit",
        }, "dispatching write batch");

        let results: Vec<Result<WriteResult, WriteError>> = match mode {
            SendMode::Bulk => {
                let request = BatchWriteRequest {
                    database: self.database.clone(),
                    writes,
                };
                match transport.batch_write(request).await {
                    Ok(resp) => (0..n)
                        .map(|i| {
                            let wire_result = resp.write_results.get(i);
                            match resp.status.get(i) {
                                Some(status) => resolve_bulk(wire_result, status),
                                None => Err(WriteError::Transport(
                                    "response shorter than request".to_string(),
                                )),
                            }
                        })
                        .collect(),
                    Err(e) => {
                        tracing::warn!(error = %e, "batchWrite RPC failed; rejecting entire batch");
                        vec![Err(e); n]
                    }
                }
            }
            SendMode::Commit { transaction } => {
                let request = CommitRequest {
                    database: self.database.clone(),
                    writes,
                    transaction,
                };
                match transport.commit(request).await {
                    Ok(resp) => (0..n)
                        .map(|i| {
                            let write_time = resp
                                .write_results
                                .get(i)
                                .and_then(|r| r.update_time)
                                .unwrap_or(resp.commit_time);
                            Ok(WriteResult { write_time })
                        })
                        .collect(),
                    Err(e) => {
                        tracing::warn!(error = %e, "commit RPC failed; rejecting entire commit");
                        vec![Err(e); n]
                    }
                }
            }
        };

        let ordered_results = results.clone();
        for (op, result) in self.operations.drain(..).zip(results) {
            op.resolve(result);
        }

        if let Some(tx) = self.completion_tx.take() {
            let _ = tx.send(());
        }

        (doc_paths, ordered_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Payload, WriteOperation};
    use crate::test_support::FakeTransport;
    use crate::wire::Mutation;

    fn op(path: &str) -> (WriteOperation, crate::operation::PendingWrite) {
        let payload: crate::operation::PayloadProducer = Arc::new(|| Payload {
            write: Write {
                document_path: "placeholder".to_string(),
                operation: Mutation::Create {
                    fields: serde_json::json!({}),
                },
                update_mask: None,
                update_transforms: Vec::new(),
                current_document: None,
            },
            precondition: None,
        });
        WriteOperation::new(crate::operation::WriteKind::Set, DocumentPath::new(path), payload)
    }

    #[test]
    fn append_tracks_doc_paths_and_fills_to_ready() {
        let mut batch = WriteBatch::new(2, "db".to_string());
        let (op1, _p1) = op("a");
        let (op2, _p2) = op("b");
        batch.append(op1).unwrap();
        assert_eq!(batch.state(), BatchState::Open);
        batch.append(op2).unwrap();
        assert_eq!(batch.state(), BatchState::ReadyToSend);
    }

    #[test]
    fn append_rejects_duplicate_document() {
        let mut batch = WriteBatch::new(10, "db".to_string());
        let (op1, _p1) = op("a");
        let (op2, _p2) = op("a");
        batch.append(op1).unwrap();
        let err = batch.append(op2).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateDocument(_)));
    }

    #[test]
    fn append_after_ready_fails() {
        let mut batch = WriteBatch::new(10, "db".to_string());
        batch.mark_ready_to_send();
        let (op1, _p1) = op("a");
        let err = batch.append(op1).unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyCommitted));
    }

    #[test]
    fn block_on_and_unblock_round_trip() {
        let mut batch = WriteBatch::new(10, "db".to_string());
        let doc = DocumentPath::new("a");
        assert!(!batch.is_blocked());
        batch.block_on(doc.clone());
        assert!(batch.is_blocked());
        batch.unblock(&doc);
        assert!(!batch.is_blocked());
    }

    #[tokio::test]
    async fn send_resolves_every_operation_and_signals_completion() {
        let transport = FakeTransport::new();
        let mut batch = WriteBatch::new(10, "db".to_string());
        let (op1, p1) = op("a");
        let (op2, p2) = op("b");
        batch.append(op1).unwrap();
        batch.append(op2).unwrap();
        batch.mark_ready_to_send();
        let completion = batch.completion();

        let (doc_paths, results) = batch.send(transport.clone(), SendMode::Bulk).await;
        assert_eq!(doc_paths.len(), 2);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(transport.batch_write_call_count(), 1);

        assert!(p1.await.is_ok());
        assert!(p2.await.is_ok());
        assert!(completion.await.is_ok());
    }

    #[tokio::test]
    async fn send_rejects_every_operation_on_transport_failure() {
        let transport = FakeTransport::new();
        transport.arm_failure();
        let mut batch = WriteBatch::new(10, "db".to_string());
        let (op1, p1) = op("a");
        batch.append(op1).unwrap();
        batch.mark_ready_to_send();

        let (_doc_paths, results) = batch.send(transport.clone(), SendMode::Bulk).await;
        assert!(results[0].is_err());
        assert!(p1.await.is_err());
    }

    #[tokio::test]
    async fn send_surfaces_per_index_failure_without_affecting_siblings() {
        let transport = FakeTransport::new();
        transport.arm_status_failure(1, crate::error::StatusCode::Unavailable);
        let mut batch = WriteBatch::new(10, "db".to_string());
        let (op1, p1) = op("a");
        let (op2, p2) = op("b");
        let (op3, p3) = op("c");
        batch.append(op1).unwrap();
        batch.append(op2).unwrap();
        batch.append(op3).unwrap();
        batch.mark_ready_to_send();

        let (_doc_paths, results) = batch.send(transport.clone(), SendMode::Bulk).await;
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(WriteError::Status {
                code: crate::error::StatusCode::Unavailable,
                ..
            })
        ));
        assert!(results[2].is_ok());

        assert!(p1.await.is_ok());
        assert!(p2.await.is_err());
        assert!(p3.await.is_ok());
    }
}
