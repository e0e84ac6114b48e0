//! The Serializer collaborator: field validation, path/value coercion,
//! sentinel handling, and protobuf projection are entirely its concern. The
//! scheduler only calls it at two points — synchronously at enqueue (to
//! validate and to build an explicit precondition), and later, deferred,
//! from inside a batch's `payload` thunk (to project the final wire write).

use serde_json::Value;

use crate::error::SchedulerError;
use crate::operation::{MergeOptions, PreconditionInput, WriteKind};
use crate::path::DocumentPath;
use crate::wire::{Precondition, Write};

/// User-data validation, wire projection, and precondition construction.
///
/// None of this crate's scheduling logic depends on what a `Serializer`
/// actually does with field paths or sentinels — only on the three
/// entry points below existing and `project` being pure.
#[cfg_attr(test, mockall::automock)]
pub trait Serializer: Send + Sync {
    /// Rejects non-plain-object inputs, conflicting field paths (e.g. both
    /// `"a"` and `"a.b"`), and disallowed sentinel placements. Called
    /// synchronously at the enqueue site; an `Err` here never touches a
    /// batch.
    fn validate(
        &self,
        kind: WriteKind,
        data: &Value,
        merge: Option<&MergeOptions>,
    ) -> Result<(), SchedulerError>;

    /// Converts `{documentPath, userData, mergeOptions?}` into the wire
    /// `write` message, optionally pairing it with a precondition the
    /// projector itself determined was required (e.g. `update` asserting
    /// existence). Invoked lazily from the operation's payload thunk, at
    /// send time — see [`crate::batch::WriteBatch::send`] — never at
    /// append time, so it always observes the final document state.
    fn project(
        &self,
        path: &DocumentPath,
        kind: WriteKind,
        data: &Value,
        merge: Option<&MergeOptions>,
    ) -> (Write, Option<Precondition>);

    /// Builds a wire precondition from caller-supplied input
    /// (`exists: bool` xor `lastUpdateTime: Timestamp`).
    fn build_precondition(&self, input: &PreconditionInput) -> Result<Precondition, SchedulerError>;
}
