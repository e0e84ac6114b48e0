//! Plain-data wire shapes for the Transport RPCs.
//!
//! Real callers speak protobuf (`google.firestore.v1.Write` and friends);
//! this crate never generates or depends on that code. These types are the
//! minimal serde-less surface the [`crate::transport::Transport`] trait
//! needs in order to describe a request/response without pulling a gRPC
//! stack into a library that is only a scheduler.

use serde_json::Value;

/// Server timestamp, seconds + nanos, the same split protobuf's
/// `google.protobuf.Timestamp` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub const fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }
}

/// Server-side assertion gating a mutation. Exactly one of `exists` /
/// `last_update_time` — never both, per the Serializer's precondition
/// builder (`xor` in the data model).
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    Exists(bool),
    LastUpdateTime(Timestamp),
}

/// A server-computed field mutation (timestamp stamp, numeric increment,
/// array union/remove). Carried verbatim; the scheduler never interprets
/// transform contents.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTransform {
    pub field_path: String,
    pub transform_type: Value,
}

/// The mutation payload itself, as the Serializer's projector produces it.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create { fields: Value },
    Update { fields: Value },
    Delete,
}

/// One entry of a `writes[]` array, fully formed and ready to serialize
/// onto an RPC.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub document_path: String,
    pub operation: Mutation,
    /// Present only when the projector determined a field mask is needed
    /// (`update` with a partial field set).
    pub update_mask: Option<Vec<String>>,
    pub update_transforms: Vec<FieldTransform>,
    /// Attached at send time, not at append time — see
    /// [`crate::batch::WriteBatch::send`].
    pub current_document: Option<Precondition>,
}

/// Per-write outcome, index-aligned with the request's `writes[]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    pub update_time: Option<Timestamp>,
}

/// Per-write wire status, index-aligned with the request's `writes[]`, used
/// only in bulk (`batchWrite`) mode.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteStatus {
    pub code: crate::error::StatusCode,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct BatchWriteRequest {
    pub database: String,
    pub writes: Vec<Write>,
}

#[derive(Debug, Clone)]
pub struct BatchWriteResponse {
    pub write_results: Vec<WriteResult>,
    pub status: Vec<WriteStatus>,
}

#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub database: String,
    pub writes: Vec<Write>,
    pub transaction: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct CommitResponse {
    pub write_results: Vec<WriteResult>,
    pub commit_time: Timestamp,
}

#[derive(Debug, Clone)]
pub struct BeginTransactionRequest {
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct BeginTransactionResponse {
    pub transaction: Vec<u8>,
}
