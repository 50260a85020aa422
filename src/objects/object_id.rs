//! Object identifier (SHA-1 hash)
//!
//! An object id is the 20-byte SHA-1 of an object's canonical header and
//! payload. It is held raw rather than as hex: the pack index fans out on
//! the first byte and binary-searches the raw key, so hex is only produced
//! at the edges (paths, display, prefix resolution).
//!
//! ## Storage
//!
//! Loose objects live at `objects/<first-2-hex>/<remaining-38-hex>`.

use crate::errors::StoreError;
use crate::objects::{OBJECT_ID_HEX_LENGTH, OBJECT_ID_RAW_LENGTH};
use std::io;
use std::path::PathBuf;

/// Immutable 20-byte object identifier.
///
/// Equality and ordering are lexicographic over the unsigned raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId([u8; OBJECT_ID_RAW_LENGTH]);

impl ObjectId {
    /// Wrap 20 raw bytes.
    pub const fn new(raw: [u8; OBJECT_ID_RAW_LENGTH]) -> Self {
        ObjectId(raw)
    }

    /// Parse an id from a raw byte slice.
    ///
    /// # Returns
    ///
    /// The id, or `StoreError::BadFormat` when the slice is not exactly
    /// 20 bytes.
    pub fn from_raw_bytes(raw: &[u8]) -> anyhow::Result<Self> {
        let raw: [u8; OBJECT_ID_RAW_LENGTH] = raw
            .try_into()
            .map_err(|_| StoreError::BadFormat(format!("{} raw bytes", raw.len())))?;
        Ok(ObjectId(raw))
    }

    /// Parse and validate an id from a 40-character hex string.
    ///
    /// # Returns
    ///
    /// The id, or `StoreError::BadFormat` on wrong length or non-hex
    /// characters.
    pub fn from_hex(hex: &str) -> anyhow::Result<Self> {
        if hex.len() != OBJECT_ID_HEX_LENGTH || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::BadFormat(hex.to_string()).into());
        }

        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
                .map_err(|_| StoreError::BadFormat(hex.to_string()))?;
        }
        Ok(ObjectId(raw))
    }

    /// Read an id from 20 binary bytes of a stream.
    ///
    /// Used when deserializing tree entries.
    pub fn read_raw_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        reader.read_exact(&mut raw)?;
        Ok(ObjectId(raw))
    }

    /// Write the id in binary form (20 bytes).
    ///
    /// Used when serializing tree entries.
    pub fn write_raw_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.0)?;
        Ok(())
    }

    pub fn as_raw_bytes(&self) -> &[u8; OBJECT_ID_RAW_LENGTH] {
        &self.0
    }

    /// Copy the raw bytes into the front of `dst`.
    pub fn copy_raw_to(&self, dst: &mut [u8]) {
        dst[..OBJECT_ID_RAW_LENGTH].copy_from_slice(&self.0);
    }

    /// First raw byte, used to index the pack fanout table.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Render as 40 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        let mut hex = String::with_capacity(OBJECT_ID_HEX_LENGTH);
        for byte in &self.0 {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    /// Test whether this id starts with the given hex prefix.
    ///
    /// Odd-length prefixes compare the trailing nibble on its own. A
    /// prefix that is not valid hex, or longer than a full id, matches
    /// nothing.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        if prefix.len() > OBJECT_ID_HEX_LENGTH {
            return false;
        }
        for (i, c) in prefix.chars().enumerate() {
            let Some(nibble) = c.to_digit(16) else {
                return false;
            };
            let actual = if i % 2 == 0 {
                self.0[i / 2] >> 4
            } else {
                self.0[i / 2] & 0x0f
            };
            if nibble as u8 != actual {
                return false;
            }
        }
        true
    }

    /// Relative path of the loose object file for this id.
    ///
    /// Splits the hex form as `xx/yyyy…` where `xx` is the first two
    /// characters.
    pub fn to_loose_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Mutable object id for hot-loop iteration.
///
/// Carries the same 20 bytes as [`ObjectId`] but permits in-place refill,
/// so a cursor walking an index table does not allocate per entry. It is
/// deliberately not `Hash`: take a [`snapshot`](MutableObjectId::snapshot)
/// before using the value as a map key or retaining it.
#[derive(Debug, Clone, Default)]
pub struct MutableObjectId([u8; OBJECT_ID_RAW_LENGTH]);

impl MutableObjectId {
    pub fn new() -> Self {
        MutableObjectId([0u8; OBJECT_ID_RAW_LENGTH])
    }

    /// Replace the held bytes with 20 bytes of `src` starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics when `src` holds fewer than `offset + 20` bytes.
    pub fn refill_from(&mut self, src: &[u8], offset: usize) {
        self.0
            .copy_from_slice(&src[offset..offset + OBJECT_ID_RAW_LENGTH]);
    }

    /// Immutable copy of the current bytes.
    pub fn snapshot(&self) -> ObjectId {
        ObjectId(self.0)
    }

    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    pub fn as_raw_bytes(&self) -> &[u8; OBJECT_ID_RAW_LENGTH] {
        &self.0
    }
}

impl From<ObjectId> for MutableObjectId {
    fn from(id: ObjectId) -> Self {
        MutableObjectId(id.0)
    }
}
