//! Bulk Write Scheduler
//!
//! A Rust scheduler for batching single-document mutations against a remote
//! document database into bounded RPC batches, with per-document
//! single-flight and an atomic all-or-nothing commit path.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bulk_write_scheduler::{BulkWriter, DocumentPath};
//! use std::sync::Arc;
//!
//! # async fn run(transport: Arc<dyn bulk_write_scheduler::Transport>, serializer: Arc<dyn bulk_write_scheduler::Serializer>) -> Result<(), Box<dyn std::error::Error>> {
//! let writer = BulkWriter::builder("projects/p/databases/(default)")
//!     .transport(transport)
//!     .serializer(serializer)
//!     .build()?;
//!
//! let result = writer
//!     .set(DocumentPath::new("users/alice"), serde_json::json!({"name": "Alice"}), None)
//!     .await?;
//!
//! writer.close().await;
//! let _ = result.await;
//! # Ok(())
//! # }
//! ```

mod batch;
mod commit;
mod error;
mod operation;
mod path;
mod retry;
mod serializer;
mod transport;
mod wire;
mod writer;

pub use commit::{CommitCoordinator, CommitCoordinatorBuilder, IDLE_THRESHOLD_MS};
pub use error::{SchedulerError, StatusCode, WriteError};
pub use operation::{MergeOptions, PendingWrite, PreconditionInput, WriteKind, WriteResult};
pub use path::DocumentPath;
pub use retry::{apply_jitter, JitterMode, RetryConfig};
pub use serializer::Serializer;
pub use transport::Transport;
pub use wire::{
    BatchWriteRequest, BatchWriteResponse, BeginTransactionRequest, BeginTransactionResponse,
    CommitRequest, CommitResponse, FieldTransform, Mutation, Precondition, Timestamp, Write,
};
pub use writer::{BulkWriter, WriterBuilder, WriterConfig, MAX_BATCH_SIZE};

#[cfg(test)]
pub(crate) mod test_support;
