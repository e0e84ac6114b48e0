//! `CommitCoordinator`: the atomic, all-or-nothing commit path. Wraps a
//! single [`WriteBatch`] and decides, at commit time, whether the write
//! needs to go through a transaction to survive a mid-flight connection
//! reset.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::batch::{SendMode, WriteBatch};
use crate::error::{SchedulerError, WriteError};
use crate::operation::{
    MergeOptions, Payload, PayloadProducer, PendingWrite, PreconditionInput, WriteKind,
    WriteOperation, WriteResult,
};
use crate::path::DocumentPath;
use crate::serializer::Serializer;
use crate::transport::Transport;
use crate::wire::BeginTransactionRequest;

/// The hosting environment tears down idle connections after roughly 120s;
/// past this threshold a non-transactional commit can no longer be safely
/// retried on connection reset, so the coordinator wraps it in a
/// transaction instead.
pub const IDLE_THRESHOLD_MS: i64 = 110_000;

#[must_use = "a builder does nothing until `.build()` is called"]
pub struct CommitCoordinatorBuilder {
    database: String,
    max_operations: usize,
}

impl CommitCoordinatorBuilder {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            max_operations: crate::writer::MAX_BATCH_SIZE,
        }
    }

    pub fn max_operations(mut self, n: usize) -> Self {
        self.max_operations = n;
        self
    }

    pub fn build(self, transport: Arc<dyn Transport>, serializer: Arc<dyn Serializer>) -> CommitCoordinator {
        CommitCoordinator {
            database: self.database.clone(),
            max_operations: self.max_operations,
            transport,
            serializer,
            batch: WriteBatch::new(self.max_operations, self.database),
            committed: false,
        }
    }
}

pub struct CommitCoordinator {
    database: String,
    max_operations: usize,
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn Serializer>,
    batch: WriteBatch,
    committed: bool,
}

impl CommitCoordinator {
    pub fn new(transport: Arc<dyn Transport>, serializer: Arc<dyn Serializer>) -> Self {
        CommitCoordinatorBuilder::new(String::new()).build(transport, serializer)
    }

    pub fn builder(database: impl Into<String>) -> CommitCoordinatorBuilder {
        CommitCoordinatorBuilder::new(database)
    }

    pub fn create(&mut self, path: DocumentPath, data: Value) -> Result<PendingWrite, SchedulerError> {
        self.enqueue(WriteKind::Create, path, data, None, None)
    }

    pub fn set(
        &mut self,
        path: DocumentPath,
        data: Value,
        merge: Option<MergeOptions>,
    ) -> Result<PendingWrite, SchedulerError> {
        self.enqueue(WriteKind::Set, path, data, merge, None)
    }

    pub fn update(
        &mut self,
        path: DocumentPath,
        data: Value,
        precondition: Option<PreconditionInput>,
    ) -> Result<PendingWrite, SchedulerError> {
        self.enqueue(WriteKind::Update, path, data, None, precondition)
    }

    pub fn delete(
        &mut self,
        path: DocumentPath,
        precondition: Option<PreconditionInput>,
    ) -> Result<PendingWrite, SchedulerError> {
        self.enqueue(WriteKind::Delete, path, Value::Null, None, precondition)
    }

    /// Appends an operation to the pending commit. Fails with
    /// `AlreadyCommitted` once `commit` has been called and not reset.
    fn enqueue(
        &mut self,
        kind: WriteKind,
        path: DocumentPath,
        data: Value,
        merge: Option<MergeOptions>,
        precondition: Option<PreconditionInput>,
    ) -> Result<PendingWrite, SchedulerError> {
        if self.committed {
            return Err(SchedulerError::AlreadyCommitted);
        }
        self.serializer.validate(kind, &data, merge.as_ref())?;

        let explicit_precondition = precondition
            .as_ref()
            .map(|p| self.serializer.build_precondition(p))
            .transpose()?;

        let serializer = self.serializer.clone();
        let payload_path = path.clone();
        let payload: PayloadProducer = Arc::new(move || {
            let (write, projected) = serializer.project(&payload_path, kind, &data, merge.as_ref());
            Payload {
                write,
                precondition: explicit_precondition.clone().or(projected),
            }
        });

        let (op, pending) = WriteOperation::new(kind, path, payload);
        self.batch.append(op)?;
        Ok(pending)
    }

    /// Drives the batch to an atomic `commit`, choosing transactional vs.
    /// direct, then returns every operation's result in enqueue order —
    /// the ordered counterpart to `BulkWriter`'s per-operation promises.
    ///
    /// Marking `committed = true` does not forbid a later `reset` + retry —
    /// only a second `commit` without an intervening `reset`.
    pub async fn commit(
        &mut self,
        explicit_transaction: Option<Vec<u8>>,
    ) -> Result<Vec<Result<WriteResult, WriteError>>, SchedulerError> {
        if self.committed {
            return Err(SchedulerError::AlreadyCommitted);
        }
        self.committed = true;

        let transaction = match explicit_transaction {
            Some(id) => Some(id),
            None => self.resolve_transaction().await?,
        };

        let empty = WriteBatch::new(self.max_operations, self.database.clone());
        let batch = std::mem::replace(&mut self.batch, empty);
        let (_doc_paths, results) = batch
            .send(self.transport.clone(), SendMode::Commit { transaction })
            .await;
        Ok(results)
    }

    /// Transactional vs. direct decision: calls `beginTransaction` first when
    /// the connection has gone idle past the threshold.
    async fn resolve_transaction(&self) -> Result<Option<Vec<u8>>, SchedulerError> {
        if !self.transport.prefer_transactions() {
            return Ok(None);
        }
        let needs_transaction = match self.transport.last_successful_request_millis() {
            None => true,
            Some(last) => now_millis() - last > IDLE_THRESHOLD_MS,
        };
        if !needs_transaction {
            return Ok(None);
        }

        tracing::info!(
            idle_ms = ?self
                .transport
                .last_successful_request_millis()
                .map(|last| now_millis() - last),
            "connection idle past threshold; wrapping commit in a transaction"
        );

        let resp = self
            .transport
            .begin_transaction(BeginTransactionRequest {
                database: self.database.clone(),
            })
            .await
            .map_err(|e| SchedulerError::InvalidArgument(e.to_string()))?;
        Ok(Some(resp.transaction))
    }

    /// Clears the operation list and the `committed` flag so this
    /// coordinator can be reused by a retry loop owned by a higher layer.
    pub fn reset(&mut self) {
        self.batch = WriteBatch::new(self.max_operations, self.database.clone());
        self.committed = false;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
