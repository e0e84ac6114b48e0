//! Test doubles shared by this crate's unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{SchedulerError, StatusCode, WriteError};
use crate::operation::{MergeOptions, WriteKind};
use crate::path::DocumentPath;
use crate::serializer::Serializer;
use crate::transport::Transport;
use crate::operation::PreconditionInput;
use crate::wire::{
    BatchWriteRequest, BatchWriteResponse, BeginTransactionRequest, BeginTransactionResponse,
    CommitRequest, CommitResponse, Mutation, Precondition, Timestamp, Write, WriteResult,
    WriteStatus,
};

/// Treats `data` as the final document fields verbatim: no field-mask
/// projection, no implicit preconditions. Enough to exercise the
/// scheduler's batching and dispatch logic in isolation from real field
/// validation.
pub(crate) struct PassthroughSerializer;

impl Serializer for PassthroughSerializer {
    fn validate(
        &self,
        _kind: WriteKind,
        data: &Value,
        _merge: Option<&MergeOptions>,
    ) -> Result<(), SchedulerError> {
        if !data.is_object() && !data.is_null() {
            return Err(SchedulerError::InvalidArgument(
                "data must be an object".into(),
            ));
        }
        Ok(())
    }

    fn project(
        &self,
        path: &DocumentPath,
        kind: WriteKind,
        data: &Value,
        _merge: Option<&MergeOptions>,
    ) -> (Write, Option<Precondition>) {
        let operation = match kind {
            WriteKind::Delete => Mutation::Delete,
            WriteKind::Update => Mutation::Update {
                fields: data.clone(),
            },
            WriteKind::Create | WriteKind::Set => Mutation::Create {
                fields: data.clone(),
            },
        };
        let write = Write {
            document_path: path.as_str().to_string(),
            operation,
            update_mask: None,
            update_transforms: Vec::new(),
            current_document: None,
        };
        (write, None)
    }

    fn build_precondition(&self, input: &PreconditionInput) -> Result<Precondition, SchedulerError> {
        Ok(match input {
            PreconditionInput::Exists(b) => Precondition::Exists(*b),
            PreconditionInput::LastUpdateTime(t) => Precondition::LastUpdateTime(*t),
        })
    }
}

struct FakeTransportState {
    next_write_time: i64,
    batch_write_calls: usize,
    commit_calls: usize,
    begin_transaction_calls: usize,
    fail_next: bool,
    status_failure: Option<(usize, StatusCode)>,
    prefer_transactions: bool,
    last_successful_request_millis: Option<i64>,
}

/// A scripted `Transport`. Every call succeeds with a synthesized `OK`
/// status and a monotonically increasing write time unless a failure has
/// been armed with [`FakeTransport::arm_failure`]. Records call counts for
/// assertions.
pub(crate) struct FakeTransport {
    state: Mutex<FakeTransportState>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeTransportState {
                next_write_time: 1,
                batch_write_calls: 0,
                commit_calls: 0,
                begin_transaction_calls: 0,
                fail_next: false,
                status_failure: None,
                prefer_transactions: false,
                last_successful_request_millis: None,
            }),
        })
    }

    pub(crate) fn set_prefer_transactions(&self, prefer: bool) {
        self.state.lock().prefer_transactions = prefer;
    }

    pub(crate) fn set_last_successful_request_millis(&self, millis: Option<i64>) {
        self.state.lock().last_successful_request_millis = millis;
    }

    pub(crate) fn arm_failure(&self) {
        self.state.lock().fail_next = true;
    }

    /// Arms a single-index wire failure for the next `batch_write` call:
    /// that index comes back with `update_time: None` and the given
    /// status code, while every other index still succeeds.
    pub(crate) fn arm_status_failure(&self, index: usize, code: StatusCode) {
        self.state.lock().status_failure = Some((index, code));
    }

    pub(crate) fn batch_write_call_count(&self) -> usize {
        self.state.lock().batch_write_calls
    }

    pub(crate) fn commit_call_count(&self) -> usize {
        self.state.lock().commit_calls
    }

    pub(crate) fn begin_transaction_call_count(&self) -> usize {
        self.state.lock().begin_transaction_calls
    }

    fn next_timestamp(&self) -> Timestamp {
        let mut state = self.state.lock();
        let t = state.next_write_time;
        state.next_write_time += 1;
        Timestamp::new(t, 0)
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteResponse, WriteError> {
        let (fail, status_failure) = {
            let mut state = self.state.lock();
            state.batch_write_calls += 1;
            (
                std::mem::take(&mut state.fail_next),
                state.status_failure.take(),
            )
        };
        if fail {
            return Err(WriteError::Transport("synthetic failure".into()));
        }
        let n = request.writes.len();
        let mut write_results = Vec::with_capacity(n);
        let mut status = Vec::with_capacity(n);
        for i in 0..n {
            match status_failure {
                Some((failed_index, code)) if failed_index == i => {
                    write_results.push(WriteResult { update_time: None });
                    status.push(WriteStatus {
                        code,
                        message: "synthetic per-index failure".into(),
                    });
                }
                _ => {
                    write_results.push(WriteResult {
                        update_time: Some(self.next_timestamp()),
                    });
                    status.push(WriteStatus {
                        code: StatusCode::Ok,
                        message: String::new(),
                    });
                }
            }
        }
        self.state.lock().last_successful_request_millis = Some(0);
        Ok(BatchWriteResponse {
            write_results,
            status,
        })
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitResponse, WriteError> {
        let fail = {
            let mut state = self.state.lock();
            state.commit_calls += 1;
            std::mem::take(&mut state.fail_next)
        };
        if fail {
            return Err(WriteError::Transport("synthetic failure".into()));
        }
        let n = request.writes.len();
        let commit_time = self.next_timestamp();
        let write_results = (0..n).map(|_| WriteResult { update_time: None }).collect();
        self.state.lock().last_successful_request_millis = Some(0);
        Ok(CommitResponse {
            write_results,
            commit_time,
        })
    }

    async fn begin_transaction(
        &self,
        _request: BeginTransactionRequest,
    ) -> Result<BeginTransactionResponse, WriteError> {
        self.state.lock().begin_transaction_calls += 1;
        Ok(BeginTransactionResponse {
            transaction: vec![1, 2, 3],
        })
    }

    fn prefer_transactions(&self) -> bool {
        self.state.lock().prefer_transactions
    }

    fn last_successful_request_millis(&self) -> Option<i64> {
        self.state.lock().last_successful_request_millis
    }
}
