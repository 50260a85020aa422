//! Git-compatible content-addressed object store
//!
//! `casket` persists immutable byte blobs (blobs, trees, commits, tags)
//! keyed by the SHA-1 of their canonical serialized form, in the two
//! on-disk layouts the wider Git ecosystem reads and writes:
//!
//! - *loose*: one deflate-compressed file per object under
//!   `objects/xx/yyyy…`;
//! - *packed*: many objects concatenated in a pack file, located through
//!   a fanout-indexed companion `.idx` (formats v1 and v2).
//!
//! The [`ObjectDatabase`] façade ties both together behind
//! `has_object` / `open_object` / `write_object`. Everything stored
//! upholds the content-addressing invariant: the id equals the SHA-1 of
//! `"<type> <length>\0"` followed by the payload, enforced by the writer
//! and re-verified by the readers.
//!
//! ```no_run
//! use casket::{CoreConfig, ObjectDatabase};
//!
//! # fn main() -> anyhow::Result<()> {
//! let db = ObjectDatabase::open(".git/objects", CoreConfig::default())?;
//! let id = db.write_blob(b"hello")?;
//! let object = db.open_object(&id)?.expect("just written");
//! assert_eq!(object.data.as_ref(), b"hello");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod database;
pub mod errors;
pub mod loose;
pub mod objects;
pub mod pack;

pub use config::CoreConfig;
pub use database::ObjectDatabase;
pub use errors::StoreError;
pub use objects::blob::Blob;
pub use objects::commit::{Author, Commit};
pub use objects::object::{Object, Packable, RawObject, Unpackable};
pub use objects::object_id::{MutableObjectId, ObjectId};
pub use objects::object_type::ObjectType;
pub use objects::tree::{Tree, TreeEntry};
pub use pack::{DeltaBaseSource, IndexEntry, Pack, PackIndex};
