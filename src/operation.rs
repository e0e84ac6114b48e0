//! The in-memory record of one enqueued mutation, and the promise a caller
//! holds for its eventual result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::WriteError;
use crate::path::DocumentPath;
use crate::wire::{Precondition, Write, WriteResult as WireWriteResult};

/// Which surface method produced this operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Create,
    Set,
    Update,
    Delete,
}

/// Options accepted by `set`, mirroring Firestore's merge semantics: merge
/// all fields present in the payload, or merge only an explicit field list.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub merge_all: bool,
    pub merge_fields: Vec<String>,
}

/// Caller-supplied precondition input, before the Serializer turns it into
/// a wire [`Precondition`].
#[derive(Debug, Clone)]
pub enum PreconditionInput {
    Exists(bool),
    LastUpdateTime(crate::wire::Timestamp),
}

/// What a batch resolves an operation with on success.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    pub write_time: crate::wire::Timestamp,
}

/// The deferred `{write, precondition?}` producer an operation carries.
///
/// Must be pure and idempotent: a batch may invoke it more than once under
/// retry (see [`crate::commit::CommitCoordinator::reset`]).
pub type PayloadProducer = Arc<dyn Fn() -> Payload + Send + Sync>;

/// What a payload producer yields when invoked, at send time.
#[derive(Debug, Clone)]
pub struct Payload {
    pub write: Write,
    pub precondition: Option<Precondition>,
}

/// One enqueued mutation, owned by the batch it lives in until that batch
/// distributes results.
pub struct WriteOperation {
    pub kind: WriteKind,
    pub document_path: DocumentPath,
    pub(crate) payload: PayloadProducer,
    result_tx: Option<oneshot::Sender<Result<WriteResult, WriteError>>>,
}

impl WriteOperation {
    /// Builds the operation together with the receiver half its caller will
    /// hand back as a [`PendingWrite`]. The channel is created here, at
    /// construction time, not at append time — it is what the data model
    /// calls the operation's "single-use promise... handed to the caller
    /// at enqueue time".
    pub(crate) fn new(
        kind: WriteKind,
        document_path: DocumentPath,
        payload: PayloadProducer,
    ) -> (Self, PendingWrite) {
        let (tx, rx) = oneshot::channel();
        let op = WriteOperation {
            kind,
            document_path,
            payload,
            result_tx: Some(tx),
        };
        (op, PendingWrite(rx))
    }

    /// Invokes the payload producer to obtain the final wire write plus any
    /// precondition, attaching the precondition to `write.current_document`
    /// per the batch send contract.
    pub(crate) fn serialize(&self) -> Write {
        let Payload {
            mut write,
            precondition,
        } = (self.payload)();
        if precondition.is_some() {
            write.current_document = precondition;
        }
        write
    }

    /// Resolves this operation's result exactly once. A dropped receiver
    /// (caller lost interest) is not an error for the batch.
    pub(crate) fn resolve(mut self, result: Result<WriteResult, WriteError>) {
        if let Some(tx) = self.result_tx.take() {
            let _ = tx.send(result);
        }
    }
}

/// Builds a [`WriteResult`] from a wire write-result for bulk mode: success
/// requires both `status == OK` and an `update_time`.
pub(crate) fn resolve_bulk(
    wire_result: Option<&WireWriteResult>,
    status: &crate::wire::WriteStatus,
) -> Result<WriteResult, WriteError> {
    if status.code == crate::error::StatusCode::Ok {
        match wire_result.and_then(|r| r.update_time) {
            Some(write_time) => Ok(WriteResult { write_time }),
            None => Err(WriteError::Status {
                code: status.code,
                message: "OK status but no update_time in response".to_string(),
            }),
        }
    } else {
        Err(WriteError::Status {
            code: status.code,
            message: status.message.clone(),
        })
    }
}

/// A caller's handle to a single operation's eventual result: the
/// single-use promise from the data model, modeled as a `Future` over a
/// one-shot channel.
pub struct PendingWrite(oneshot::Receiver<Result<WriteResult, WriteError>>);

impl Future for PendingWrite {
    type Output = Result<WriteResult, WriteError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll(cx).map(|r| match r {
            Ok(inner) => inner,
            Err(e) => Err(WriteError::from(e)),
        })
    }
}
