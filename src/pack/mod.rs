//! Packed object layout: many objects in one file, plus a lookup index
//!
//! A pack concatenates objects, each preceded by a variable-length
//! `(type, length)` header; two extra entry kinds store an object as a
//! delta against a base identified by relative offset (ofs-delta) or by
//! object id (ref-delta). The companion `.idx` file maps object ids to
//! byte offsets so a pack supports random access.

pub mod delta;
pub mod file;
pub mod index;

pub use file::{DeltaBaseSource, Pack};
pub use index::{IndexEntry, PackIndex};

/// Pack entry type code for an offset delta
pub const OFS_DELTA: u8 = 6;
/// Pack entry type code for a ref delta
pub const REF_DELTA: u8 = 7;

/// Size of the SHA-1 trailer closing packs and indexes
pub(crate) const TRAILER_LENGTH: u64 = 20;
