//! Failure kinds the object store distinguishes
//!
//! Functions across the crate return `anyhow::Result` and attach context on
//! the way up; the variants below are raised through that chain whenever a
//! caller needs to tell one failure apart from another. Recover them with
//! `err.downcast_ref::<StoreError>()`.
//!
//! Plain filesystem errors are not enumerated here: they stay as wrapped
//! `std::io::Error` values inside the context chain.

use crate::objects::object_id::ObjectId;
use std::path::PathBuf;

/// Errors raised by the object store.
///
/// Lookup APIs never raise `NotFound` for a missing object: an absent
/// object is an absent result (`Ok(None)` or `false`), not an error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An object that was expected to exist is absent.
    #[error("object {0} not found")]
    NotFound(ObjectId),

    /// The stored bytes disagree with the identifier, the header is
    /// malformed, or inflation failed mid-stream.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// A pack index or pack file declares a version this crate does not
    /// understand.
    #[error("unsupported pack index version {0}")]
    UnsupportedVersion(u32),

    /// Tree entries were presented out of canonical name order.
    #[error("tree entry {after:?} is not sorted after {before:?}")]
    UnsortedTree { before: String, after: String },

    /// A tree entry was serialized before its object id was assigned.
    #[error("tree entry {0:?} does not have an object id assigned")]
    MissingObjectId(String),

    /// The input stream ended before the declared length was reached.
    #[error("input ended {missing} bytes short of the declared length")]
    ShortInput { missing: u64 },

    /// The final rename could not be completed and the object is still
    /// absent after the recovery probe.
    #[error("unable to create new object {0:?}")]
    WriteFailed(PathBuf),

    /// A delta chain revisited an offset it already passed through.
    #[error("circular delta chain at pack offset {0}")]
    CircularDelta(u64),

    /// A ref-delta names a base object the database cannot resolve.
    #[error("missing delta base {0}")]
    MissingDeltaBase(ObjectId),

    /// A string was not a valid object id.
    #[error("bad object id {0:?}")]
    BadFormat(String),
}
