//! `BulkWriter`: the scheduler's public surface. Accepts single-document
//! mutations, packs them into bounded [`WriteBatch`]es, and dispatches those
//! batches to a [`Transport`] while enforcing per-document single-flight.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::future::Shared;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::batch::{BatchState, SendMode, WriteBatch};
use crate::error::SchedulerError;
use crate::operation::{
    MergeOptions, Payload, PayloadProducer, PendingWrite, PreconditionInput, WriteKind,
    WriteOperation,
};
use crate::path::DocumentPath;
use crate::serializer::Serializer;
use crate::transport::Transport;

/// Maximum writes a single `batchWrite` or `commit` RPC may carry. Matches
/// the remote service's own limit; a batch is marked ready to send the
/// instant it reaches this size.
pub const MAX_BATCH_SIZE: usize = 500;

#[derive(Clone)]
pub struct WriterConfig {
    pub database: String,
    pub max_batch_size: usize,
    pub max_concurrent_batches: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            max_batch_size: MAX_BATCH_SIZE,
            max_concurrent_batches: 1,
        }
    }
}

#[must_use = "a builder does nothing until `.build()` is called"]
pub struct WriterBuilder {
    config: WriterConfig,
    transport: Option<Arc<dyn Transport>>,
    serializer: Option<Arc<dyn Serializer>>,
}

impl WriterBuilder {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            config: WriterConfig {
                database: database.into(),
                ..WriterConfig::default()
            },
            transport: None,
            serializer: None,
        }
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    pub fn max_concurrent_batches(mut self, n: usize) -> Self {
        self.config.max_concurrent_batches = n.max(1);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn build(self) -> Result<BulkWriter, SchedulerError> {
        let transport = self
            .transport
            .ok_or_else(|| SchedulerError::InvalidArgument("transport not set".into()))?;
        let serializer = self
            .serializer
            .ok_or_else(|| SchedulerError::InvalidArgument("serializer not set".into()))?;
        if self.config.max_batch_size == 0 || self.config.max_batch_size > MAX_BATCH_SIZE {
            return Err(SchedulerError::InvalidArgument(format!(
                "max_batch_size must be in 1..={MAX_BATCH_SIZE}"
            )));
        }

        Ok(BulkWriter {
            config: self.config,
            transport,
            serializer,
            state: Arc::new(Mutex::new(WriterState::new())),
        })
    }
}

/// Synchronous scheduler bookkeeping, guarded by a single lock. Mutated
/// under the lock and released before any async work (RPC dispatch) starts;
/// async work operates on batches already popped out of this state.
struct WriterState {
    queue: VecDeque<WriteBatch>,
    /// Union of document paths held by every batch currently dispatched
    /// (popped from `queue`, RPC in flight, not yet completed). Maintained
    /// incrementally by `pop_dispatchable` (insert) and `on_batch_completed`
    /// (remove) rather than recomputed from batch state, since dispatched
    /// batches no longer live in `queue`.
    in_flight_docs: HashSet<DocumentPath>,
    /// Completion futures of batches currently dispatched, keyed by an
    /// id local to this writer. `flush`/`close` need these alongside
    /// `queue`'s completions, since a dispatched batch has already been
    /// removed from `queue` by the time they snapshot outstanding work.
    in_flight_completions: HashMap<u64, Shared<oneshot::Receiver<()>>>,
    next_batch_id: u64,
    closed: bool,
}

impl WriterState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight_docs: HashSet::new(),
            in_flight_completions: HashMap::new(),
            next_batch_id: 0,
            closed: false,
        }
    }

    /// Returns the batch `path` should be appended to, opening a fresh one
    /// if the current tail is absent, already past `Open`, or — per the
    /// same-document split rule — already holds a write for `path`.
    fn open_tail(&mut self, max_batch_size: usize, database: &str, path: &DocumentPath) -> &mut WriteBatch {
        let needs_new = match self.queue.back_mut() {
            Some(b) if b.state() == BatchState::Open && b.contains(path) => {
                b.mark_ready_to_send();
                true
            }
            Some(b) => b.state() != BatchState::Open,
            None => true,
        };
        if needs_new {
            self.queue
                .push_back(WriteBatch::new(max_batch_size, database.to_string()));
        }
        self.queue.back_mut().expect("just pushed")
    }
}

pub struct BulkWriter {
    config: WriterConfig,
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn Serializer>,
    state: Arc<Mutex<WriterState>>,
}

impl BulkWriter {
    pub fn builder(database: impl Into<String>) -> WriterBuilder {
        WriterBuilder::new(database)
    }

    pub async fn create(&self, path: DocumentPath, data: Value) -> Result<PendingWrite, SchedulerError> {
        self.enqueue(WriteKind::Create, path, data, None, None)
    }

    pub async fn set(
        &self,
        path: DocumentPath,
        data: Value,
        merge: Option<MergeOptions>,
    ) -> Result<PendingWrite, SchedulerError> {
        self.enqueue(WriteKind::Set, path, data, merge, None)
    }

    pub async fn update(
        &self,
        path: DocumentPath,
        data: Value,
        precondition: Option<PreconditionInput>,
    ) -> Result<PendingWrite, SchedulerError> {
        self.enqueue(WriteKind::Update, path, data, None, precondition)
    }

    pub async fn delete(
        &self,
        path: DocumentPath,
        precondition: Option<PreconditionInput>,
    ) -> Result<PendingWrite, SchedulerError> {
        self.enqueue(WriteKind::Delete, path, Value::Null, None, precondition)
    }

    fn enqueue(
        &self,
        kind: WriteKind,
        path: DocumentPath,
        data: Value,
        merge: Option<MergeOptions>,
        precondition: Option<PreconditionInput>,
    ) -> Result<PendingWrite, SchedulerError> {
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

        let (op, pending) = WriteOperation::new(kind, path.clone(), payload);

        let mut state = self.state.lock();
        if state.closed {
            return Err(SchedulerError::Closed);
        }

        let blocked = state.in_flight_docs.contains(&path);
        let batch = state.open_tail(self.config.max_batch_size, &self.config.database, &path);
        batch.append(op)?;
        if blocked {
            batch.block_on(path.clone());
            batch.mark_ready_to_send();
        }
        drop(state);

        dispatch(self.state.clone(), self.transport.clone(), self.config.clone());

        Ok(pending)
    }

    /// Marks every `Open` batch `ReadyToSend`, kicks the dispatcher, and
    /// waits for every batch that existed at the moment of the call to
    /// complete. Snapshots the set of outstanding completions once, up
    /// front, so writes enqueued after `flush` is called are not waited on.
    pub async fn flush(&self) {
        let completions: Vec<_> = {
            let mut state = self.state.lock();
            for batch in state.queue.iter_mut() {
                batch.mark_ready_to_send();
            }
            state
                .queue
                .iter()
                .map(|b| b.completion())
                .chain(state.in_flight_completions.values().cloned())
                .collect()
        };
        dispatch(self.state.clone(), self.transport.clone(), self.config.clone());
        for c in completions {
            let _ = c.await;
        }
    }

    /// Marks the writer closed: no further operations may be enqueued.
    /// Already-queued and in-flight batches are still dispatched and
    /// awaited.
    pub async fn close(&self) {
        self.state.lock().closed = true;
        self.flush().await;
    }
}

/// Pops every dispatchable batch (ready to send, unblocked, within the
/// concurrency cap) and spawns its send, recursively re-invoking itself once
/// each spawned batch completes so newly unblocked batches get picked up.
///
/// A free function rather than a `&self` method: each spawned task needs to
/// own everything it touches to satisfy `tokio::spawn`'s `'static` bound.
fn dispatch(state: Arc<Mutex<WriterState>>, transport: Arc<dyn Transport>, config: WriterConfig) {
    loop {
        let next = {
            let mut guard = state.lock();
            pop_dispatchable(&mut guard, config.max_concurrent_batches)
        };
        let Some((id, batch)) = next else { break };

        let state = state.clone();
        let transport = transport.clone();
        let config = config.clone();

        tokio::spawn(async move {
            // BulkWriter always dispatches through the non-atomic RPC;
            // the transactional path lives entirely in CommitCoordinator,
            // which owns its own WriteBatch independent of this queue.
            let (doc_paths, _results) = batch.send(transport.clone(), SendMode::Bulk).await;

            {
                let mut guard = state.lock();
                on_batch_completed(&mut guard, id, &doc_paths);
            }

            dispatch(state, transport, config);
        });
    }
}

/// Pops the front-most dispatchable batch, if any, and folds its documents
/// into `in_flight_docs`/`in_flight_completions`. A batch is dispatchable
/// when it is `ReadyToSend`, unblocked, and the concurrency cap has room.
/// Scans front-to-back so batches dispatch in append order whenever
/// possible, but does not require the front batch specifically — a blocked
/// head must not starve a ready batch behind it.
fn pop_dispatchable(state: &mut WriterState, max_concurrent: usize) -> Option<(u64, WriteBatch)> {
    if state.in_flight_completions.len() >= max_concurrent {
        return None;
    }
    let idx = state
        .queue
        .iter()
        .position(|b| b.state() == BatchState::ReadyToSend && !b.is_blocked())?;
    let batch = state.queue.remove(idx)?;
    for doc in batch.doc_paths() {
        state.in_flight_docs.insert(doc.clone());
    }
    let id = state.next_batch_id;
    state.next_batch_id += 1;
    state.in_flight_completions.insert(id, batch.completion());
    Some((id, batch))
}

/// Clears a completed batch's documents from the in-flight set and unblocks
/// any queued batch that was waiting on one of them. Queued batches that
/// become fully unblocked are not re-marked ready here — they already are,
/// since a batch only ever blocks after being marked ready at append time.
fn on_batch_completed(state: &mut WriterState, id: u64, doc_paths: &[DocumentPath]) {
    state.in_flight_completions.remove(&id);
    for doc in doc_paths {
        state.in_flight_docs.remove(doc);
        for batch in state.queue.iter_mut() {
            batch.unblock(doc);
        }
    }
}
