//! Pack file reader
//!
//! Reads one object out of a pack given its byte offset. Non-delta
//! entries inflate directly; delta entries first reconstruct their base —
//! found by relative offset inside the same pack, or by id anywhere in
//! the owning database — and then apply the delta instructions.
//!
//! All file access is positional (`pread`), so any number of reader
//! threads can share one handle without contending on a seek cursor.

use crate::codec;
use crate::errors::StoreError;
use crate::objects::object::RawObject;
use crate::objects::object_id::ObjectId;
use crate::objects::object_type::ObjectType;
use crate::pack::index::PackIndex;
use crate::pack::{delta, OFS_DELTA, REF_DELTA, TRAILER_LENGTH};
use anyhow::Context;
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

const PACK_SIGNATURE: [u8; 4] = [b'P', b'A', b'C', b'K'];
const PACK_HEADER_LENGTH: u64 = 12;

/// Resolves the base object of a ref-delta.
///
/// Implemented by the object database: the base may live in a different
/// pack, or loose.
pub trait DeltaBaseSource {
    fn delta_base(&self, id: &ObjectId) -> anyhow::Result<Option<RawObject>>;
}

/// An open pack file and its index.
#[derive(Debug)]
pub struct Pack {
    path: PathBuf,
    file: File,
    index: PackIndex,
    /// File length minus the trailing pack hash
    data_end: u64,
}

impl Pack {
    /// Open a pack alongside its `.idx` companion.
    pub fn open(pack_path: &Path, idx_path: &Path) -> anyhow::Result<Self> {
        let index = PackIndex::open(idx_path)?;
        let file = File::open(pack_path)
            .with_context(|| format!("Unable to open pack {}", pack_path.display()))?;
        let length = file
            .metadata()
            .with_context(|| format!("Unable to stat pack {}", pack_path.display()))?
            .len();
        if length < PACK_HEADER_LENGTH + TRAILER_LENGTH {
            return Err(anyhow::anyhow!(
                "Pack {} is too small to hold a header",
                pack_path.display()
            ));
        }

        let mut header = [0u8; PACK_HEADER_LENGTH as usize];
        file.read_exact_at(&mut header, 0)
            .with_context(|| format!("Unable to read pack header {}", pack_path.display()))?;
        if header[..4] != PACK_SIGNATURE {
            return Err(anyhow::anyhow!(
                "Pack {} has a bad signature",
                pack_path.display()
            ));
        }
        let version = codec::decode_u32(&header[4..]);
        if version != 2 && version != 3 {
            return Err(StoreError::UnsupportedVersion(version))
                .with_context(|| format!("Unreadable pack {}", pack_path.display()));
        }
        let object_count = codec::decode_u32(&header[8..]);
        if u64::from(object_count) != index.object_count() {
            return Err(anyhow::anyhow!(
                "Pack {} holds {object_count} objects but its index lists {}",
                pack_path.display(),
                index.object_count()
            ));
        }

        Ok(Pack {
            path: pack_path.to_path_buf(),
            file,
            index,
            data_end: length - TRAILER_LENGTH,
        })
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_object(&self, id: &ObjectId) -> bool {
        self.index.has_object(id)
    }

    pub fn find_offset(&self, id: &ObjectId) -> Option<u64> {
        self.index.find_offset(id)
    }

    /// Read the object stored at `offset`.
    ///
    /// `base_source` resolves ref-delta bases that live outside this
    /// pack. Fails with `CircularDelta` when an ofs-delta chain revisits
    /// an offset, `MissingDeltaBase` when a ref-delta base cannot be
    /// resolved.
    pub fn read(&self, offset: u64, base_source: &dyn DeltaBaseSource) -> anyhow::Result<RawObject> {
        let mut chain = Vec::new();
        self.read_chain(offset, base_source, &mut chain)
            .with_context(|| format!("Unable to read pack {} at {offset}", self.path.display()))
    }

    fn read_chain(
        &self,
        offset: u64,
        base_source: &dyn DeltaBaseSource,
        chain: &mut Vec<u64>,
    ) -> anyhow::Result<RawObject> {
        if chain.contains(&offset) {
            return Err(StoreError::CircularDelta(offset).into());
        }
        chain.push(offset);

        if offset < PACK_HEADER_LENGTH || offset >= self.data_end {
            return Err(anyhow::anyhow!("Object offset {offset} is out of range"));
        }

        let mut reader = BufReader::new(SectionReader {
            file: &self.file,
            position: offset,
            end: self.data_end,
        });
        let (code, length) = read_entry_header(&mut reader)?;

        match code {
            OFS_DELTA => {
                let base_offset = read_ofs_base(&mut reader, offset)?;
                let delta_bytes = inflate_exact(reader, length)?;
                let base = self.read_chain(base_offset, base_source, chain)?;
                let data = delta::apply(&base.data, &delta_bytes)?;
                Ok(RawObject::new(base.kind, data))
            }
            REF_DELTA => {
                let base_id = ObjectId::read_raw_from(&mut reader)
                    .context("Unable to read delta base id")?;
                let delta_bytes = inflate_exact(reader, length)?;
                // prefer a base in this pack, keeping the chain so
                // in-pack cycles surface as CircularDelta
                let base = match self.index.find_offset(&base_id) {
                    Some(base_offset) => self.read_chain(base_offset, base_source, chain)?,
                    None => base_source
                        .delta_base(&base_id)?
                        .ok_or(StoreError::MissingDeltaBase(base_id))?,
                };
                let data = delta::apply(&base.data, &delta_bytes)?;
                Ok(RawObject::new(base.kind, data))
            }
            storable => {
                let kind = ObjectType::from_code(storable)?;
                let data = inflate_exact(reader, length)?;
                Ok(RawObject::new(kind, data))
            }
        }
    }
}

/// Positional reads over a byte range of the pack.
///
/// Each instance carries its own cursor; the shared file descriptor is
/// only touched through `read_at`.
struct SectionReader<'pack> {
    file: &'pack File,
    position: u64,
    end: u64,
}

impl Read for SectionReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.end.saturating_sub(self.position);
        if remaining == 0 {
            return Ok(0);
        }
        let want = buf.len().min(remaining as usize);
        let read = self.file.read_at(&mut buf[..want], self.position)?;
        self.position += read as u64;
        Ok(read)
    }
}

/// Decode the variable-length `(type, length)` entry header.
fn read_entry_header(reader: &mut impl Read) -> anyhow::Result<(u8, u64)> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .context("Unable to read pack entry header")?;

    let code = (byte[0] >> 4) & 0x07;
    let mut length = u64::from(byte[0] & 0x0f);
    let mut shift = 4u32;
    let mut current = byte[0];
    while current & 0x80 != 0 {
        reader
            .read_exact(&mut byte)
            .context("Unable to read pack entry header")?;
        current = byte[0];
        length |= u64::from(current & 0x7f) << shift;
        shift += 7;
        if shift > 63 {
            return Err(anyhow::anyhow!("Pack entry header is too long"));
        }
    }

    Ok((code, length))
}

/// Decode an ofs-delta base reference: a base-128 distance with the
/// `(value + 1) << 7` continuation rule, subtracted from the delta's own
/// offset.
fn read_ofs_base(reader: &mut impl Read, delta_offset: u64) -> anyhow::Result<u64> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .context("Unable to read delta base offset")?;
    let mut current = byte[0];
    let mut distance = u64::from(current & 0x7f);

    while current & 0x80 != 0 {
        if distance > (u64::MAX >> 7) - 1 {
            return Err(anyhow::anyhow!("Delta base offset overflows 64 bits"));
        }
        reader
            .read_exact(&mut byte)
            .context("Unable to read delta base offset")?;
        current = byte[0];
        distance = ((distance + 1) << 7) | u64::from(current & 0x7f);
    }

    if distance == 0 || distance >= delta_offset {
        return Err(anyhow::anyhow!(
            "Delta base offset {distance} escapes the pack"
        ));
    }
    Ok(delta_offset - distance)
}

/// Inflate one entry payload, which must produce exactly `expected`
/// bytes.
fn inflate_exact(reader: impl Read, expected: u64) -> anyhow::Result<Bytes> {
    let mut data = Vec::with_capacity(expected.min(8 * 1024 * 1024) as usize);
    ZlibDecoder::new(reader)
        .read_to_end(&mut data)
        .context("Unable to inflate pack entry")?;
    if data.len() as u64 != expected {
        return Err(anyhow::anyhow!(
            "Pack entry inflated to {} bytes, header declared {expected}",
            data.len()
        ));
    }
    Ok(Bytes::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case(vec![0x35], 3, 5)] // blob, 5 bytes
    #[case(vec![0x90, 0x01], 1, 16)] // commit, one continuation
    #[case(vec![0xa4, 0xa3, 0x02], 2, 0x1234)] // tree, two continuations
    fn entry_header_round_trip(#[case] bytes: Vec<u8>, #[case] code: u8, #[case] length: u64) {
        let (parsed_code, parsed_length) =
            read_entry_header(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed_code, code);
        assert_eq!(parsed_length, length);
    }

    #[rstest]
    fn ofs_base_single_byte() {
        // distance 5 from offset 100
        let base = read_ofs_base(&mut Cursor::new(vec![0x05]), 100).unwrap();
        assert_eq!(base, 95);
    }

    #[rstest]
    fn ofs_base_continuation_bytes() {
        // 0x81 0x00 encodes (1 + 1) << 7 | 0 = 256
        let base = read_ofs_base(&mut Cursor::new(vec![0x81, 0x00]), 300).unwrap();
        assert_eq!(base, 44);
    }

    #[rstest]
    fn ofs_base_may_not_escape_the_pack() {
        assert!(read_ofs_base(&mut Cursor::new(vec![0x64]), 100).is_err());
        assert!(read_ofs_base(&mut Cursor::new(vec![0x65]), 100).is_err());
        assert!(read_ofs_base(&mut Cursor::new(vec![0x00]), 100).is_err());
    }
}
