//! The Transport collaborator: network transport, auth, and deadlines are
//! entirely its concern. The scheduler only ever calls these three RPCs and
//! reads two policy values off it.

use crate::error::WriteError;
use crate::wire::{
    BatchWriteRequest, BatchWriteResponse, BeginTransactionRequest, BeginTransactionResponse,
    CommitRequest, CommitResponse,
};

/// Network transport for the three RPCs the scheduler drives, plus the two
/// policy values [`crate::commit::CommitCoordinator`] reads to decide
/// transactional vs. direct commit.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Non-atomic bulk write. Per-index success/failure.
    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteResponse, WriteError>;

    /// Atomic write. Either all writes apply or the call fails.
    async fn commit(&self, request: CommitRequest) -> Result<CommitResponse, WriteError>;

    /// Opens a transaction, returning the opaque id to thread through a
    /// subsequent `commit`.
    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> Result<BeginTransactionResponse, WriteError>;

    /// Static policy flag: does this deployment prefer wrapping idle-connection
    /// commits in a transaction?
    fn prefer_transactions(&self) -> bool;

    /// Monotonic wall-clock timestamp (ms since epoch) of the last RPC this
    /// transport completed successfully, updated by the transport itself.
    /// `None` before the first successful RPC.
    fn last_successful_request_millis(&self) -> Option<i64>;
}
