//! Loose object reader
//!
//! Reads a loose file, detects which of the two on-disk formats it uses,
//! inflates, and verifies that the recomputed SHA-1 equals the id the
//! object was looked up by. Detection keys on the file bytes rather than
//! configuration: a legacy file is a bare zlib stream, which is
//! recognizable from its first two bytes (deflate method nibble plus a
//! checksum divisible by 31), while a packed-style file starts with a
//! varint header carrying a storable type code.

use crate::errors::StoreError;
use crate::objects::object::RawObject;
use crate::objects::object_id::ObjectId;
use crate::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use sha1::{Digest, Sha1};
use std::io::{Cursor, Read};
use std::path::Path;

/// Read and verify the loose object stored under `id`.
///
/// # Returns
///
/// `Ok(None)` when no loose file exists for the id; `CorruptObject` when
/// the file exists but its content cannot be verified.
pub fn read(objects_dir: &Path, id: &ObjectId) -> anyhow::Result<Option<RawObject>> {
    let path = objects_dir.join(id.to_loose_path());
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Unable to read object file {}", path.display()))
        }
    };

    parse(&raw, id).map(Some)
}

/// Parse and verify one loose file image against its id.
pub(crate) fn parse(raw: &[u8], id: &ObjectId) -> anyhow::Result<RawObject> {
    if raw.len() < 2 {
        return Err(corrupt(id, "file too short"));
    }

    if is_zlib_stream(raw[0], raw[1]) {
        parse_legacy(raw, id)
    } else {
        parse_packed_style(raw, id)
    }
}

/// A legacy loose file is one bare zlib stream: deflate method nibble in
/// the first byte, bit 7 clear, and the two-byte header checksum
/// divisible by 31.
fn is_zlib_stream(b0: u8, b1: u8) -> bool {
    (b0 & 0x8f) == 0x08 && ((u16::from(b0) << 8) | u16::from(b1)) % 31 == 0
}

fn parse_legacy(raw: &[u8], id: &ObjectId) -> anyhow::Result<RawObject> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(raw)
        .read_to_end(&mut inflated)
        .map_err(|err| corrupt(id, &format!("inflate failed: {err}")))?;

    let mut cursor = Cursor::new(inflated.as_slice());
    let (kind, length) =
        ObjectType::parse_header(&mut cursor).map_err(|err| corrupt(id, &err.to_string()))?;
    let payload = &inflated[cursor.position() as usize..];
    if payload.len() as u64 != length {
        return Err(corrupt(id, "declared length disagrees with payload"));
    }

    // the legacy image is exactly the canonical hashed form
    let mut digest = Sha1::new();
    digest.update(&inflated);
    verify(id, digest)?;

    Ok(RawObject::new(kind, Bytes::copy_from_slice(payload)))
}

fn parse_packed_style(raw: &[u8], id: &ObjectId) -> anyhow::Result<RawObject> {
    let (code, length, header_len) =
        decode_packed_header(raw).ok_or_else(|| corrupt(id, "truncated header"))?;
    let kind = ObjectType::from_code(code).map_err(|err| corrupt(id, &err.to_string()))?;

    let mut payload = Vec::new();
    ZlibDecoder::new(&raw[header_len..])
        .read_to_end(&mut payload)
        .map_err(|err| corrupt(id, &format!("inflate failed: {err}")))?;
    if payload.len() as u64 != length {
        return Err(corrupt(id, "declared length disagrees with payload"));
    }

    let mut digest = Sha1::new();
    digest.update(format!("{} {}\0", kind.as_str(), length).as_bytes());
    digest.update(&payload);
    verify(id, digest)?;

    Ok(RawObject::new(kind, payload))
}

/// Decode the packed-style varint header from the front of a file image.
///
/// # Returns
///
/// `(type code, length, header byte count)`, or `None` when the image
/// ends inside the header.
fn decode_packed_header(raw: &[u8]) -> Option<(u8, u64, usize)> {
    let mut position = 0;
    let mut current = *raw.get(position)?;
    position += 1;

    let code = (current >> 4) & 0x07;
    let mut length = u64::from(current & 0x0f);
    let mut shift = 4u32;
    while current & 0x80 != 0 {
        current = *raw.get(position)?;
        position += 1;
        length |= u64::from(current & 0x7f) << shift;
        shift += 7;
        if shift > 63 {
            return None;
        }
    }

    Some((code, length, position))
}

fn verify(id: &ObjectId, digest: Sha1) -> anyhow::Result<()> {
    let actual = ObjectId::new(digest.finalize().into());
    if actual != *id {
        return Err(corrupt(id, &format!("content hashes to {actual}")));
    }
    Ok(())
}

fn corrupt(id: &ObjectId, reason: &str) -> anyhow::Error {
    tracing::debug!(id = %id, reason, "corrupt loose object");
    StoreError::CorruptObject {
        id: *id,
        reason: reason.to_string(),
    }
    .into()
}
