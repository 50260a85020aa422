//! Core object traits
//!
//! - `Packable`: serialization to the canonical on-disk form
//! - `Unpackable`: deserialization from that form (header already consumed)
//! - `Object`: common operations (id computation, loose path)
//!
//! ## Object Format
//!
//! Every object hashes and serializes as:
//! ```text
//! <type> <length>\0<payload>
//! ```

use crate::objects::object_id::ObjectId;
use crate::objects::object_type::ObjectType;
use anyhow::Result;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Trait for serializing objects to their canonical binary form
pub trait Packable {
    /// Serialize the payload, without the canonical header.
    fn serialize_content(&self) -> Result<Bytes>;
}

/// Trait for deserializing objects from their canonical binary form
pub trait Unpackable {
    /// Deserialize the payload from a reader (header already consumed).
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

/// Common object operations
pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    /// Serialize the object with its canonical header prepended.
    fn serialize(&self) -> Result<Bytes> {
        let content = self.serialize_content()?;
        let mut bytes = Vec::with_capacity(content.len() + 32);
        write!(bytes, "{} {}\0", self.object_type().as_str(), content.len())?;
        bytes.write_all(&content)?;
        Ok(Bytes::from(bytes))
    }

    /// Compute the object id: SHA-1 over the canonical serialization.
    fn object_id(&self) -> Result<ObjectId> {
        let mut hasher = Sha1::new();
        hasher.update(&self.serialize()?);
        Ok(ObjectId::new(hasher.finalize().into()))
    }

    /// Relative loose path this object would be stored at.
    fn loose_path(&self) -> Result<PathBuf> {
        Ok(self.object_id()?.to_loose_path())
    }
}

/// A stored object as handed back by lookups: its kind and payload bytes.
///
/// The payload excludes the canonical header; `size()` is the declared
/// object length, which always equals `data.len()` once a read succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectType,
    pub data: Bytes,
}

impl RawObject {
    pub fn new(kind: ObjectType, data: impl Into<Bytes>) -> Self {
        RawObject {
            kind,
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
