//! Loose object layout: one deflate-compressed file per object
//!
//! ## Storage Format
//!
//! Objects are stored at `objects/ab/cdef123...` (first two hex characters
//! as directory, rest as file name). Two file formats exist:
//!
//! - *Legacy*: the whole file is one zlib stream whose inflated bytes start
//!   with the ASCII header `<type> <length>\0`.
//! - *Packed-style*: the file starts with an uncompressed variable-length
//!   `(type, length)` header, followed by the zlib-compressed payload.
//!
//! Writers pick one via [`crate::CoreConfig::use_legacy_headers`]; readers
//! detect the format from the file bytes and accept both.

pub mod reader;
pub mod writer;

pub use reader::read;
pub use writer::ObjectWriter;
